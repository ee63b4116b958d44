//! An async HTTP/1.1 client built on `micro-fetch-http`.
//!
//! A [`Request`] describes one operation: method, URL, headers, trailers, body, a
//! response size limit, a timeout, a redirect policy and the collaborators it runs with.
//! [`Request::execute`] performs it under a [`Context`] and hands the final response to a
//! [`Handler`], which reads the body as a stream.
//!
//! # Architecture
//!
//! - [`Request`]: the builder, consumed by `execute`
//! - [`Context`]: deadline and cancellation of the caller
//! - [`body`]: restartable request bodies
//! - [`pool`]: [`pool::Connector`], [`pool::Pool`] and the keep-alive pool
//! - [`redirect`]: redirect policies and the hops they decide on
//! - [`jar`]: the cookie storage contract
//! - [`Handler`], [`HandlerState`] and [`ResponseBody`]: the response side, with
//!   ready-made handlers in [`extract`]
//! - [`fetch`]: one call JSON requests
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use micro_fetch::{extract, ClientError, Context, Request};
//! use micro_fetch::redirect::RedirectPolicy;
//!
//! # async fn run() -> Result<(), ClientError> {
//! let body = Request::get("http://127.0.0.1:8080/")
//!     .set_header("accept", "text/plain")
//!     .timeout(Duration::from_secs(10))
//!     .redirect_policy(RedirectPolicy::default())
//!     .execute(&Context::background(), extract::text())
//!     .await?;
//! println!("{body}");
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//!
//! - HTTP/1.1 over plain TCP; bring a [`pool::Connector`] for anything else
//! - Requests are never retried automatically

pub mod body;
pub mod extract;
pub mod jar;
pub mod pool;
pub mod redirect;

mod context;
mod error;
mod execute;
mod fetch;
mod handler;
mod request;
mod response;

#[cfg(test)]
mod test_support;

pub use body::{BodySource, RequestBody};
pub use context::Context;
pub use error::{ClientError, StatusError};
pub use execute::DRAIN_LIMIT;
pub use fetch::{fetch, fetch_with};
pub use handler::{Handler, HandlerFn, HandlerState, handler_fn};
pub use request::{DEFAULT_LIMIT_BYTES, Request};
pub use response::ResponseBody;
