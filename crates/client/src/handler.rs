//! Response handlers
//!
//! A [`Handler`] turns one streamed response into a value. It receives a
//! [`HandlerState`]: status and header are there from the start, the body is read
//! forward only, and trailer fields are known once the body has ended.
//!
//! ```no_run
//! use micro_fetch::{handler_fn, ClientError, Context, Request};
//!
//! # async fn run() -> Result<(), ClientError> {
//! let count = Request::get("http://127.0.0.1:8080/events")
//!     .execute(&Context::background(), handler_fn(|state| Box::pin(async move {
//!         let mut lines = 0;
//!         while let Some(chunk) = state.body().chunk().await? {
//!             lines += chunk.iter().filter(|b| **b == b'\n').count();
//!         }
//!         Ok(lines)
//!     })))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::marker::PhantomData;

use async_trait::async_trait;
use futures::future::BoxFuture;
use http::{Method, Version};
use micro_fetch_http::connection::{Connection, HttpConnection};
use micro_fetch_http::protocol::{Header, ResponseHead, Status};
use url::Url;

use crate::ClientError;
use crate::response::ResponseBody;

#[async_trait]
pub trait Handler: Send + Sync {
    type Output: Send;

    async fn read_http(&self, state: &mut HandlerState) -> Result<Self::Output, ClientError>;
}

/// a [`Handler`] backed by a closure returning a boxed future
pub struct HandlerFn<F, T> {
    f: F,
    _output: PhantomData<fn() -> T>,
}

pub fn handler_fn<F, T>(f: F) -> HandlerFn<F, T>
where
    F: for<'a> Fn(&'a mut HandlerState) -> BoxFuture<'a, Result<T, ClientError>> + Send + Sync,
{
    HandlerFn { f, _output: PhantomData }
}

#[async_trait]
impl<F, T> Handler for HandlerFn<F, T>
where
    F: for<'a> Fn(&'a mut HandlerState) -> BoxFuture<'a, Result<T, ClientError>> + Send + Sync,
    T: Send,
{
    type Output = T;

    async fn read_http(&self, state: &mut HandlerState) -> Result<T, ClientError> {
        (self.f)(state).await
    }
}

impl<F, T> std::fmt::Debug for HandlerFn<F, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

/// One response, as handed to a [`Handler`].
#[derive(Debug)]
pub struct HandlerState {
    connection: Connection,
    method: Method,
    url: Url,
    version: Version,
    status: Status,
    header: Header,
    body: ResponseBody,
}

impl HandlerState {
    pub(crate) fn new(method: Method, url: Url, head: ResponseHead, body: ResponseBody) -> Self {
        let (version, status, header) = head.into_parts();
        let connection = body.connection().connection().clone();
        Self { connection, method, url, version, status, header, body }
    }

    /// The connection the response arrives on; closing it aborts any pending body read.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Method of the request that produced this response.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// URL of the request that produced this response, after any redirects.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub fn status(&self) -> &Status {
        &self.status
    }

    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn body(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    /// The trailer fields of the response, empty when none were sent.
    ///
    /// Trailers follow the body on the wire, so the body has to be read to its end first;
    /// there is no implicit draining.
    ///
    /// # Errors
    ///
    /// [`ClientError::ConnectionClosed`] when the connection was closed before the end of
    /// the body, [`ClientError::TrailerBeforeBodyDrained`] when the body hasn't ended yet.
    pub fn trailer(&self) -> Result<Header, ClientError> {
        if self.body.is_drained() {
            return Ok(self.body.trailers().cloned().map(Header::from).unwrap_or_default());
        }
        if self.connection.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }
        Err(ClientError::TrailerBeforeBodyDrained)
    }

    pub(crate) fn into_connection(self) -> HttpConnection {
        self.body.into_connection()
    }
}
