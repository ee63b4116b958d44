//! HTTP response decoder
//!
//! Decodes responses as a stream of [`Message`]s: one head, then payload items until EOF.
//! Body framing depends on the request method, so the connection announces every request
//! with [`ResponseDecoder::expect_response_to`] before reading its response.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use http::Method;
//! use micro_fetch_http::codec::ResponseDecoder;
//! use micro_fetch_http::protocol::Message;
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = ResponseDecoder::new();
//! decoder.expect_response_to(Method::GET);
//!
//! let mut buffer = BytesMut::from("HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi");
//! let Some(Message::Header((head, _))) = decoder.decode(&mut buffer).unwrap() else { panic!() };
//! assert_eq!(head.status().code(), 200);
//! ```

use crate::codec::body::PayloadDecoder;
use crate::codec::header::{HeaderDecoder, parse_payload};
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, ResponseHead};
use bytes::BytesMut;
use http::Method;
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

/// A decoder for HTTP responses that handles both the head and the payload
///
/// - `payload_decoder` is `None`: waiting for (or parsing) a response head
/// - `payload_decoder` is `Some`: parsing the body of the current response
#[derive(Debug, Default)]
pub struct ResponseDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
    request_method: Option<Method>,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the method of the request whose response is read next.
    pub fn expect_response_to(&mut self, method: Method) {
        self.request_method = Some(method);
    }

    /// Whether the current body, if any, has been decoded completely.
    pub fn is_idle(&self) -> bool {
        self.payload_decoder.is_none()
    }

    fn decode_payload(&mut self, src: &mut BytesMut, eof: bool) -> Result<Option<Message<(ResponseHead, PayloadSize)>>, ParseError> {
        let Some(payload_decoder) = &mut self.payload_decoder else {
            return Ok(None);
        };

        let item = if eof { payload_decoder.decode_eof(src)? } else { payload_decoder.decode(src)? };
        let message = match item {
            Some(item @ (PayloadItem::Chunk(_) | PayloadItem::Trailers(_))) => Some(Message::Payload(item)),
            Some(item @ PayloadItem::Eof) => {
                // no need payload decoder in this response now
                self.payload_decoder.take();
                Some(Message::Payload(item))
            }
            None => None,
        };
        Ok(message)
    }

    fn decode_head(&mut self, src: &mut BytesMut) -> Result<Option<Message<(ResponseHead, PayloadSize)>>, ParseError> {
        loop {
            if src.is_empty() {
                return Ok(None);
            }

            let Some(request_method) = self.request_method.as_ref() else {
                return Err(ParseError::invalid_header("received data while no request is in flight"));
            };

            let Some(head) = self.header_decoder.decode(src)? else {
                return Ok(None);
            };

            // interim responses are skipped, 101 ends HTTP on this connection
            if head.status().is_informational() && head.status().code() != 101 {
                trace!(status = %head.status(), "skip interim response");
                continue;
            }

            let payload_size = parse_payload(&head, request_method)?;
            debug!(status = %head.status(), ?payload_size, "decoded response head");

            self.request_method = None;
            self.payload_decoder = Some(payload_size.into());
            return Ok(Some(Message::Header((head, payload_size))));
        }
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<(ResponseHead, PayloadSize)>;
    type Error = ParseError;

    /// # Returns
    ///
    /// - `Ok(Some(Message::Header(_)))`: decoded a final (non 1xx) response head
    /// - `Ok(Some(Message::Payload(_)))`: decoded a payload item
    /// - `Ok(None)`: need more data to proceed
    /// - `Err(_)`: encountered a parsing error
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.payload_decoder.is_some() {
            return self.decode_payload(src, false);
        }
        self.decode_head(src)
    }

    /// The server closed the connection.
    ///
    /// Ending between responses is fine, and so is ending a close-delimited body. A
    /// partial head or a truncated body is [`ParseError::Incomplete`].
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.payload_decoder.is_some() {
            return self.decode_payload(src, true);
        }

        match self.decode_head(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(ParseError::Incomplete),
        }
    }
}
