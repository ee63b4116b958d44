//! Client side connection handling
//!
//! - [`Connection`]: cloneable handle exposing the negotiated [`Protocol`](crate::protocol::Protocol)
//!   and a close signal any task may fire
//! - [`HttpConnection`]: one transport byte stream driving the request encoder and the
//!   response decoder, one exchange at a time

mod handle;
mod http_connection;

pub use handle::Connection;
pub use http_connection::{HttpConnection, Io};
