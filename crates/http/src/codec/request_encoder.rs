//! HTTP request encoder
//!
//! Writes a request head followed by its payload items. The framing chosen for the head
//! decides which body encoder handles the payload.

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, PayloadSize, RequestHead, SendError};
use bytes::{Buf, BytesMut};
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Encoder;
use tracing::error;

#[derive(Debug, Default)]
pub struct RequestEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl RequestEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the previous request has been written completely.
    pub fn is_idle(&self) -> bool {
        self.payload_encoder.is_none()
    }
}

impl<D: Buf> Encoder<Message<(RequestHead, PayloadSize), D>> for RequestEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(RequestHead, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive request head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                let payload_encoder = PayloadEncoder::try_from(payload_size)?;
                self.header_encoder.encode((head, payload_size), dst)?;
                if !payload_encoder.is_finish() {
                    self.payload_encoder = Some(payload_encoder);
                }
                Ok(())
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    if payload_item.is_eof() {
                        return Ok(());
                    }
                    error!("expect request head but receive payload item");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                let is_eof = payload_item.is_eof();
                let result = payload_encoder.encode(payload_item, dst);

                if is_eof || payload_encoder.is_finish() {
                    self.payload_encoder.take();
                }

                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::protocol::PayloadItem;
    use http::{HeaderMap, Request};

    fn head(request: Request<()>) -> Message<(RequestHead, PayloadSize)> {
        let payload_size = PayloadSize::Chunked;
        Message::Header((RequestHead::from(request), payload_size))
    }

    #[test]
    fn chunked_request_with_trailers() {
        let mut encoder = RequestEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(head(Request::post("http://example.com/upload").body(()).unwrap()), &mut dst).unwrap();
        encoder.encode(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"data"))), &mut dst).unwrap();

        let mut trailers = HeaderMap::new();
        trailers.insert("x-sum", "42".parse().unwrap());
        encoder.encode(Message::<_, Bytes>::Payload(PayloadItem::Trailers(trailers)), &mut dst).unwrap();
        assert!(encoder.is_idle());
        encoder.encode(Message::<_, Bytes>::Payload(PayloadItem::Eof), &mut dst).unwrap();

        assert_eq!(
            &dst[..],
            &b"POST /upload HTTP/1.1\r\ntransfer-encoding: chunked\r\n\r\n4\r\ndata\r\n0\r\nx-sum: 42\r\n\r\n"[..]
        );
    }

    #[test]
    fn empty_request_is_idle_after_head() {
        let mut encoder = RequestEncoder::new();
        let mut dst = BytesMut::new();

        let request = Request::get("http://example.com/").body(()).unwrap();
        encoder.encode(Message::<_, Bytes>::Header((RequestHead::from(request), PayloadSize::Empty)), &mut dst).unwrap();
        assert!(encoder.is_idle());
        encoder.encode(Message::<_, Bytes>::Payload(PayloadItem::Eof), &mut dst).unwrap();
        assert_eq!(&dst[..], b"GET / HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn payload_before_head_is_rejected() {
        let mut encoder = RequestEncoder::new();
        let mut dst = BytesMut::new();
        let chunk = Message::<(RequestHead, PayloadSize)>::Payload(PayloadItem::Chunk(Bytes::from_static(b"x")));
        assert!(encoder.encode(chunk, &mut dst).is_err());
    }
}
