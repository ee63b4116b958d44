//! HTTP/1.1 client codec: request encoding and response decoding
//!
//! - [`RequestEncoder`]: writes a request head, then the body with the framing the head
//!   announced (fixed length, chunked with optional trailers, or none)
//! - [`ResponseDecoder`]: reads a response head, then its body framed per RFC 9112
//!   section 6.3 (including bodies delimited by connection close)
//!
//! Both plug into `tokio_util::codec::{FramedWrite, FramedRead}`.

mod body;
mod header;
mod request_encoder;
mod response_decoder;

pub use header::{MAX_HEADER_BYTES, MAX_HEADER_NUM};
pub use request_encoder::RequestEncoder;
pub use response_decoder::ResponseDecoder;
