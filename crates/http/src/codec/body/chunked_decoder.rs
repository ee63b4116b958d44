//! Decoder implementation for HTTP chunked transfer encoding.
//!
//! This module provides functionality to decode HTTP messages that use chunked transfer encoding
//! as specified in [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112.html#name-chunked-transfer-coding).
//!
//! Trailer fields after the last chunk are parsed and handed out as
//! [`PayloadItem::Trailers`] right before [`PayloadItem::Eof`].

use crate::codec::header::{MAX_HEADER_BYTES, MAX_HEADER_NUM};
use crate::protocol::{ParseError, PayloadItem};
use ChunkedState::{Body, BodyCr, BodyLf, End, Extension, Size, SizeLf, SizeLws, Trailer};
use bytes::{Buf, Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::io;
use std::io::ErrorKind;
use std::task::Poll;
use tokio_util::codec::Decoder;
use tracing::trace;

/// A decoder for handling HTTP chunked transfer encoding.
///
/// The decoder processes incoming bytes according to the chunked format:
/// - Each chunk starts with its size in hexadecimal
/// - Followed by optional extensions and CRLF
/// - Then the chunk data and CRLF
/// - A zero-sized chunk, then optional trailer fields and an empty line, end the message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
}

impl ChunkedDecoder {
    /// Creates a new `ChunkedDecoder` instance, ready to read the size of the first chunk.
    pub fn new() -> Self {
        Self { state: Size, remaining_size: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the chunk size in hex
    Size,
    /// Handle whitespace after size
    SizeLws,
    /// Skip chunk extensions
    Extension,
    /// Read LF after chunk size
    SizeLf,
    /// Read chunk data
    Body,
    /// Read CR after chunk data
    BodyCr,
    /// Read LF after chunk data
    BodyLf,
    /// Read the trailer section, terminated by an empty line
    Trailer,
    /// Final state after the trailer section
    End,
}

/// What one step of the state machine produced besides the next state.
enum Produced {
    Nothing,
    Chunk(Bytes),
    Trailers(HeaderMap),
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    /// Decodes chunked transfer encoded data from the input buffer.
    ///
    /// # Returns
    /// - `Ok(Some(PayloadItem::Chunk(bytes)))` when a chunk is successfully decoded
    /// - `Ok(Some(PayloadItem::Trailers(map)))` once, when the message carried trailer fields
    /// - `Ok(Some(PayloadItem::Eof))` when the message is complete
    /// - `Ok(None)` when more data is needed
    /// - `Err(ParseError)` if the chunked encoding is invalid
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!("finished reading chunked data");
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                // need more data
                return Ok(None);
            }

            let mut produced = Produced::Nothing;

            self.state = match self.state.step(src, &mut self.remaining_size, &mut produced) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(ParseError::io(e)),
            };

            match produced {
                Produced::Nothing => {}
                Produced::Chunk(bytes) => {
                    trace!(len = bytes.len(), "read chunked bytes");
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }
                Produced::Trailers(trailers) => {
                    trace!(count = trailers.len(), "read chunked trailers");
                    return Ok(Some(PayloadItem::Trailers(trailers)));
                }
            }
        }
    }
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.len() > 0 {
            $src.get_u8()
        } else {
            return Poll::Pending;
        }
    }};
}

fn invalid<S: Into<String>>(reason: S) -> Poll<Result<ChunkedState, io::Error>> {
    Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, reason.into())))
}

impl ChunkedState {
    fn step(self, src: &mut BytesMut, remaining_size: &mut u64, produced: &mut Produced) -> Poll<Result<ChunkedState, io::Error>> {
        match self {
            Size => ChunkedState::read_size(src, remaining_size),
            SizeLws => ChunkedState::read_size_lws(src),
            Extension => ChunkedState::read_extension(src),
            SizeLf => ChunkedState::read_size_lf(src, *remaining_size),
            Body => ChunkedState::read_body(src, remaining_size, produced),
            BodyCr => ChunkedState::read_body_cr(src),
            BodyLf => ChunkedState::read_body_lf(src),
            Trailer => ChunkedState::read_trailer(src, produced),
            End => Poll::Ready(Ok(End)),
        }
    }

    /// Reads one hex digit of the chunk size, or the delimiter that ends it.
    fn read_size(src: &mut BytesMut, size_per_chunk: &mut u64) -> Poll<Result<ChunkedState, io::Error>> {
        let digit = match try_next_byte!(src) {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b + 10 - b'a',
            b @ b'A'..=b'F' => b + 10 - b'A',
            b'\t' | b' ' => return Poll::Ready(Ok(SizeLws)),
            b';' => return Poll::Ready(Ok(Extension)),
            b'\r' => return Poll::Ready(Ok(SizeLf)),
            _ => return invalid("invalid chunk size line: Invalid Size"),
        };

        match size_per_chunk.checked_mul(16).and_then(|size| size.checked_add(u64::from(digit))) {
            Some(size) => {
                *size_per_chunk = size;
                Poll::Ready(Ok(Size))
            }
            None => invalid("invalid overflow chunked length"),
        }
    }

    /// Linear whitespace after the size: only more whitespace, an extension or CR may follow.
    fn read_size_lws(src: &mut BytesMut) -> Poll<Result<ChunkedState, io::Error>> {
        match try_next_byte!(src) {
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => invalid("invalid chunk size linear white space"),
        }
    }

    /// Chunk extensions are skipped up to CR; a bare LF inside them is rejected.
    fn read_extension(src: &mut BytesMut) -> Poll<Result<ChunkedState, io::Error>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => invalid("invalid chunk extension contains newline"),
            _ => Poll::Ready(Ok(Extension)),
        }
    }

    /// LF ending the size line; a zero size starts the trailer section.
    fn read_size_lf(src: &mut BytesMut, size_per_chunk: u64) -> Poll<Result<ChunkedState, io::Error>> {
        match try_next_byte!(src) {
            b'\n' if size_per_chunk == 0 => Poll::Ready(Ok(Trailer)),
            b'\n' => Poll::Ready(Ok(Body)),
            _ => invalid("invalid chunk size LF"),
        }
    }

    fn read_body(src: &mut BytesMut, size_per_chunk: &mut u64, produced: &mut Produced) -> Poll<Result<ChunkedState, io::Error>> {
        if src.is_empty() {
            return Poll::Ready(Ok(Body));
        }

        if *size_per_chunk == 0 {
            return Poll::Ready(Ok(BodyCr));
        }

        // cap remaining bytes at the max capacity of usize
        let remaining = usize::try_from(*size_per_chunk).unwrap_or(usize::MAX);
        let read_size = std::cmp::min(remaining, src.len());

        *size_per_chunk -= read_size as u64;
        *produced = Produced::Chunk(src.split_to(read_size).freeze());

        if *size_per_chunk > 0 { Poll::Ready(Ok(Body)) } else { Poll::Ready(Ok(BodyCr)) }
    }

    fn read_body_cr(src: &mut BytesMut) -> Poll<Result<ChunkedState, io::Error>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(BodyLf)),
            _ => invalid("invalid chunk body CR"),
        }
    }

    fn read_body_lf(src: &mut BytesMut) -> Poll<Result<ChunkedState, io::Error>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(Size)),
            _ => invalid("invalid chunk body LF"),
        }
    }

    /// Parses the whole trailer section once it is buffered.
    ///
    /// The section is a (possibly empty) list of header fields followed by an empty line,
    /// so it is parsed as a block rather than byte by byte.
    fn read_trailer(src: &mut BytesMut, produced: &mut Produced) -> Poll<Result<ChunkedState, io::Error>> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let (consumed, fields) = match httparse::parse_headers(src, &mut headers) {
            Ok(httparse::Status::Complete((consumed, fields))) => (consumed, fields),
            Ok(httparse::Status::Partial) if src.len() > MAX_HEADER_BYTES => return invalid("trailer section too large"),
            Ok(httparse::Status::Partial) => return Poll::Pending,
            Err(e) => return invalid(format!("invalid trailer section: {e}")),
        };

        let mut trailers = HeaderMap::with_capacity(fields.len());
        for field in fields.iter() {
            let name = HeaderName::from_bytes(field.name.as_bytes()).map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
            let value = HeaderValue::from_bytes(field.value).map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
            trailers.append(name, value);
        }

        src.advance(consumed);
        if !trailers.is_empty() {
            *produced = Produced::Trailers(trailers);
        }
        Poll::Ready(Ok(End))
    }
}
