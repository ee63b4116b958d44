//! Request body framing, chosen once per request from the [`PayloadSize`] its head
//! announced.

use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{PayloadItem, PayloadSize, SendError};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadEncoder {
    Length(LengthEncoder),
    Chunked(ChunkedEncoder),
    /// the head announced no body; data would corrupt the next request on the wire
    Empty,
}

impl PayloadEncoder {
    /// Whether every byte the head announced has been written.
    pub fn is_finish(&self) -> bool {
        match self {
            Self::Length(encoder) => encoder.is_finish(),
            Self::Chunked(encoder) => encoder.is_finish(),
            Self::Empty => true,
        }
    }
}

impl TryFrom<PayloadSize> for PayloadEncoder {
    type Error = SendError;

    fn try_from(payload_size: PayloadSize) -> Result<Self, Self::Error> {
        match payload_size {
            PayloadSize::Length(size) => Ok(Self::Length(LengthEncoder::new(size))),
            PayloadSize::Chunked => Ok(Self::Chunked(ChunkedEncoder::new())),
            PayloadSize::Empty => Ok(Self::Empty),
            PayloadSize::UntilClose => Err(SendError::invalid_body("request body can't be delimited by connection close")),
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match self {
            Self::Length(encoder) => encoder.encode(item, dst),
            Self::Chunked(encoder) => encoder.encode(item, dst),
            Self::Empty => match item {
                PayloadItem::Chunk(bytes) if bytes.has_remaining() => {
                    Err(SendError::invalid_body(format!("{} body bytes for a request announced without body", bytes.remaining())))
                }
                PayloadItem::Trailers(_) => Err(SendError::invalid_body("trailers need a chunked request body")),
                PayloadItem::Chunk(_) | PayloadItem::Eof => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::HeaderMap;

    #[test]
    fn framing_follows_payload_size() {
        assert!(matches!(PayloadEncoder::try_from(PayloadSize::Length(3)), Ok(PayloadEncoder::Length(_))));
        assert!(matches!(PayloadEncoder::try_from(PayloadSize::Chunked), Ok(PayloadEncoder::Chunked(_))));
        assert!(matches!(PayloadEncoder::try_from(PayloadSize::Empty), Ok(PayloadEncoder::Empty)));
        assert!(PayloadEncoder::try_from(PayloadSize::UntilClose).is_err());
    }

    #[test]
    fn empty_body_rejects_data() {
        let mut encoder = PayloadEncoder::Empty;
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::new()), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
        assert!(encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"x")), &mut dst).is_err());
        assert!(encoder.encode(PayloadItem::<Bytes>::Trailers(HeaderMap::new()), &mut dst).is_err());
        assert!(dst.is_empty());
    }
}
