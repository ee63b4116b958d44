//! HTTP body handling for the client side
//!
//! ## Decoders (response bodies)
//! - [`ChunkedDecoder`]: chunked transfer encoding, including the trailer section
//! - [`LengthDecoder`]: fixed-length payloads
//! - [`PayloadDecoder`]: picks one of the above, or no body, or read-until-close
//!
//! ## Encoders (request bodies)
//! - [`ChunkedEncoder`]: chunked transfer encoding, writes request trailers
//! - [`LengthEncoder`]: fixed-length payload encoding
//! - [`PayloadEncoder`]: main encoder that manages different encoding strategies

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
