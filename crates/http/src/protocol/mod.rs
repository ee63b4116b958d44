//! Client-side HTTP protocol vocabulary.
//!
//! - **Message Handling** ([`message`]): codec currency
//!   - [`Message`]: either a message head or a payload item
//!   - [`PayloadItem`]: body chunks, trailer section and EOF
//!   - [`PayloadSize`]: how a body is framed on the wire
//!
//! - **Heads**: [`RequestHead`] for what is written, [`ResponseHead`] for what is read
//!
//! - **Vocabulary**: [`parse_method`] and [`MethodExt`], [`Status`], [`Protocol`]
//!
//! - **Header** ([`Header`]): lazy, zero-copy view over received header fields
//!
//! - **Error Handling** ([`error`]):
//!   - [`HttpError`]: Top-level error type
//!   - [`ParseError`]: Response parsing errors
//!   - [`SendError`]: Request sending errors

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHead;

mod response;
pub use response::ResponseHead;

mod header;
pub(crate) use header::FieldIndex;
pub use header::Header;
pub use header::Iter as HeaderIter;

mod method;
pub use method::MethodExt;
pub use method::parse_method;

mod status;
pub use status::Status;

mod transport;
pub use transport::Protocol;
pub use transport::TlsInfo;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
