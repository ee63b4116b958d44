//! HTTP/1.1 client protocol layer for micro-fetch
//!
//! This crate turns a transport byte stream into a sequence of request/response exchanges.
//! It knows nothing about pools, redirects or handlers; those live in `micro-fetch`.
//!
//! # Architecture
//!
//! - [`protocol`]: vocabulary types: [`protocol::Status`], [`protocol::Protocol`], method
//!   helpers, the lazily parsed [`protocol::Header`] view and the error types
//! - [`codec`]: [`codec::RequestEncoder`] and [`codec::ResponseDecoder`], both
//!   `tokio_util::codec` implementations
//! - [`connection`]: [`connection::HttpConnection`], which drives the codecs over one
//!   stream, and its [`connection::Connection`] handle
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http::{Method, Request};
//! use http_body_util::Empty;
//! use micro_fetch_http::connection::HttpConnection;
//! use micro_fetch_http::protocol::{PayloadItem, Protocol, RequestHead};
//! use tokio::net::TcpStream;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("127.0.0.1:8080").await?;
//! let mut conn = HttpConnection::new(stream, Protocol::http11());
//!
//! let request = Request::get("/").header("host", "127.0.0.1:8080").body(())?;
//! conn.send_request(RequestHead::from(request), Empty::<Bytes>::new()).await?;
//!
//! let (head, _) = conn.read_response_head(&Method::GET).await?;
//! println!("{}", head.status());
//! while let Some(item) = conn.next_payload().await {
//!     if let PayloadItem::Chunk(bytes) = item? {
//!         println!("{} bytes", bytes.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//!
//! - HTTP/1.1 and HTTP/1.0 only
//! - No TLS; callers hand in an already secured stream and describe it with
//!   [`protocol::TlsInfo`]
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod connection;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
