//! HTTP head processing for the client side
//!
//! - [`HeaderEncoder`]: writes the request line and request header fields
//!   - fixes up content-length / transfer-encoding from the payload framing
//!
//! - [`HeaderDecoder`]: parses the status line and response header fields
//!   - records field byte ranges instead of copying
//!   - enforces head size and field count limits
//!
//! [`parse_payload`] picks the response body framing once the head is known.

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_decoder::MAX_HEADER_BYTES;
pub use header_decoder::MAX_HEADER_NUM;
pub use header_decoder::parse_payload;
pub use header_encoder::HeaderEncoder;
