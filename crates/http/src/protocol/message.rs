use bytes::{Buf, Bytes};
use http::HeaderMap;

/// Represents a HTTP message that can either be a head or payload.
///
/// The generic parameter `T` is the head type (a request head on the way out, a response
/// head on the way in), while `Data` represents the type of the payload data (defaults to `Bytes`).
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    /// Contains the head of the message
    Header(T),
    /// Contains a chunk of payload data, the trailer section or the EOF marker
    Payload(PayloadItem<Data>),
}

/// Represents an item in the HTTP message payload stream.
///
/// Decoders produce zero or more `Chunk`s, at most one `Trailers` (chunked framing only)
/// and finally exactly one `Eof`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// Trailer fields sent after the last chunk
    Trailers(HeaderMap),
    /// Marks the end of the payload stream
    Eof,
}

/// Represents the framing of an HTTP payload.
///
/// - Known length: process exact number of bytes
/// - Chunked: process using chunked transfer encoding
/// - Empty: no payload to process
/// - `UntilClose`: the payload ends when the peer closes the connection (responses only)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload using chunked transfer encoding
    Chunked,
    /// Empty payload (no body)
    Empty,
    /// Payload delimited by the end of the connection
    UntilClose,
}

impl PayloadSize {
    /// Returns true if the payload uses chunked transfer encoding
    #[inline]
    #[must_use]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if the payload is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// Returns true if the payload is delimited by connection close
    #[inline]
    #[must_use]
    pub fn is_until_close(&self) -> bool {
        matches!(self, PayloadSize::UntilClose)
    }
}

impl<D: Buf> PayloadItem<D> {
    /// Returns true if this item represents the end of the payload stream
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    /// Returns true if this item contains chunk data
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }

    /// Returns true if this item carries the trailer section
    #[inline]
    pub fn is_trailers(&self) -> bool {
        matches!(self, PayloadItem::Trailers(_))
    }
}

impl PayloadItem {
    /// Returns a reference to the contained bytes if this is a Chunk
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Trailers(_) | PayloadItem::Eof => None,
        }
    }

    /// Returns the trailer fields if this is a Trailers item
    pub fn as_trailers(&self) -> Option<&HeaderMap> {
        match self {
            PayloadItem::Trailers(trailers) => Some(trailers),
            PayloadItem::Chunk(_) | PayloadItem::Eof => None,
        }
    }
}
