//! Decoder implementation for HTTP response payloads.
//!
//! A unified decoder over the four ways a response body can be framed:
//! - Content-Length based payloads
//! - Chunked transfer encoding
//! - Messages with no body
//! - Bodies that run until the server closes the connection

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// A unified decoder for handling HTTP message payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    /// The specific decoding strategy to use
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// Decode payload with a fixed content length
    Length(LengthDecoder),

    /// Decode payload using chunked transfer encoding
    Chunked(ChunkedDecoder),

    /// Handle messages with no body
    NoBody,

    /// Everything up to connection close is body
    UntilClose { finished: bool },
}

impl PayloadDecoder {
    /// Creates a `PayloadDecoder` for messages with no body.
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    /// Creates a `PayloadDecoder` for chunked transfer encoding.
    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    /// Creates a `PayloadDecoder` for a fixed-length payload.
    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    /// Creates a `PayloadDecoder` for a body delimited by connection close.
    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose { finished: false } }
    }
}

impl From<PayloadSize> for PayloadDecoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(size) => PayloadDecoder::fix_length(size),
            PayloadSize::Chunked => PayloadDecoder::chunked(),
            PayloadSize::Empty => PayloadDecoder::empty(),
            PayloadSize::UntilClose => PayloadDecoder::until_close(),
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    /// Delegates to the framing specific decoder. No-body messages yield EOF at once,
    /// close-delimited bodies hand out whatever has been buffered.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode(src),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
            Kind::UntilClose { finished: true } => Ok(Some(PayloadItem::Eof)),
            Kind::UntilClose { finished: false } => {
                if src.is_empty() {
                    return Ok(None);
                }
                Ok(Some(PayloadItem::Chunk(src.split().freeze())))
            }
        }
    }

    /// Called once the peer has closed its side.
    ///
    /// Only a close-delimited body may legitimately end here; for the other framings the
    /// body is truncated unless it was already complete.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Kind::UntilClose { finished } = &mut self.kind {
            if !src.is_empty() {
                return Ok(Some(PayloadItem::Chunk(src.split().freeze())));
            }
            *finished = true;
            return Ok(Some(PayloadItem::Eof));
        }

        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => Err(ParseError::Incomplete),
        }
    }
}
