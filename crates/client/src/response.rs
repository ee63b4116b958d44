//! The response body as seen by handlers.

use std::fmt;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll, ready};

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Method};
use http_body::{Body, Frame};
use http_body_util::BodyExt;
use micro_fetch_http::connection::HttpConnection;
use micro_fetch_http::protocol::{MethodExt, ParseError, PayloadItem};
use tokio::time::{Sleep, sleep_until};
use tokio_util::sync::WaitForCancellationFutureOwned;
use tracing::trace;

use crate::{ClientError, Context};

/// Forward-only stream over the body of one response.
///
/// Delivers at most the request's byte limit, then fails with
/// [`ClientError::BodyTooLarge`]. Reads also fail once the operation deadline passes,
/// the context is canceled or the connection is closed. Trailer fields are not yielded as
/// frames; read them through [`HandlerState::trailer`](crate::HandlerState::trailer) once
/// the stream has ended.
pub struct ResponseBody {
    connection: HttpConnection,
    method: Method,
    limit: Option<u64>,
    delivered: u64,
    trailers: Option<HeaderMap>,
    state: ReadState,
    deadline: Option<Pin<Box<Sleep>>>,
    canceled: Pin<Box<WaitForCancellationFutureOwned>>,
    closed: Pin<Box<WaitForCancellationFutureOwned>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Reading,
    /// the last chunk was cut at the limit, the next read fails
    Overflowed,
    Finished,
    Failed,
}

impl ResponseBody {
    pub(crate) fn new(connection: HttpConnection, method: Method, limit: Option<u64>, ctx: &Context) -> Self {
        let closed = Box::pin(connection.connection().closed_owned());
        Self {
            connection,
            method,
            limit,
            delivered: 0,
            trailers: None,
            state: ReadState::Reading,
            deadline: ctx.deadline().map(|deadline| Box::pin(sleep_until(deadline))),
            canceled: Box::pin(ctx.cancellation_token().clone().cancelled_owned()),
            closed,
        }
    }

    /// Bytes handed out so far.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Whether the body has been read to its end (always true for responses without one).
    #[must_use]
    pub fn is_drained(&self) -> bool {
        !self.method.response_body_allowed() || self.connection.is_body_done()
    }

    /// The next chunk of data, `None` at the end.
    ///
    /// # Errors
    ///
    /// See the type level docs.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, ClientError> {
        while let Some(frame) = self.frame().await {
            if let Ok(data) = frame?.into_data() {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }

    /// Reads the rest of the body into memory.
    ///
    /// # Errors
    ///
    /// See the type level docs.
    pub async fn bytes(&mut self) -> Result<Bytes, ClientError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }

    /// Reads the rest of the body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// See the type level docs; also fails for bodies that aren't UTF-8.
    pub async fn text(&mut self) -> Result<String, ClientError> {
        let bytes = self.bytes().await?;
        String::from_utf8(Vec::from(bytes)).map_err(|e| ParseError::invalid_body(format!("response body is not utf8: {e}")).into())
    }

    /// Reads and discards the rest of the body, returning the number of bytes skipped.
    ///
    /// # Errors
    ///
    /// See the type level docs.
    pub async fn drain(&mut self) -> Result<u64, ClientError> {
        let mut drained = 0;
        while let Some(chunk) = self.chunk().await? {
            drained += chunk.len() as u64;
        }
        Ok(drained)
    }

    pub(crate) fn connection(&self) -> &HttpConnection {
        &self.connection
    }

    pub(crate) fn trailers(&self) -> Option<&HeaderMap> {
        self.trailers.as_ref()
    }

    pub(crate) fn into_connection(self) -> HttpConnection {
        self.connection
    }

    fn poll_abort(&mut self, cx: &mut TaskContext<'_>) -> Option<ClientError> {
        if self.canceled.as_mut().poll(cx).is_ready() {
            return Some(ClientError::Canceled);
        }
        if let Some(deadline) = self.deadline.as_mut()
            && deadline.as_mut().poll(cx).is_ready()
        {
            return Some(ClientError::DeadlineExceeded);
        }
        if self.closed.as_mut().poll(cx).is_ready() {
            return Some(ClientError::ConnectionClosed);
        }
        None
    }

    fn fail(&mut self, error: ClientError) -> Poll<Option<Result<Frame<Bytes>, ClientError>>> {
        trace!(conn_id = self.connection.connection().id(), delivered = self.delivered, cause = %error, "response body failed");
        self.state = ReadState::Failed;
        Poll::Ready(Some(Err(error)))
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = ClientError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        match this.state {
            ReadState::Reading => {}
            ReadState::Overflowed => {
                let limit = this.limit.unwrap_or(this.delivered);
                return this.fail(ClientError::BodyTooLarge { limit });
            }
            ReadState::Finished | ReadState::Failed => return Poll::Ready(None),
        }

        // a HEAD response announces a body it never sends
        if !this.method.response_body_allowed() {
            this.state = ReadState::Finished;
            return Poll::Ready(None);
        }

        if let Some(error) = this.poll_abort(cx) {
            return this.fail(error);
        }

        loop {
            match ready!(this.connection.poll_payload(cx)) {
                Some(Ok(PayloadItem::Chunk(mut bytes))) => {
                    if bytes.is_empty() {
                        continue;
                    }

                    if let Some(limit) = this.limit {
                        let remaining = limit - this.delivered;
                        if remaining == 0 {
                            return this.fail(ClientError::BodyTooLarge { limit });
                        }
                        if bytes.len() as u64 > remaining {
                            bytes.truncate(usize::try_from(remaining).unwrap_or(bytes.len()));
                            this.state = ReadState::Overflowed;
                        }
                    }

                    this.delivered += bytes.len() as u64;
                    return Poll::Ready(Some(Ok(Frame::data(bytes))));
                }
                Some(Ok(PayloadItem::Trailers(trailers))) => this.trailers = Some(trailers),
                Some(Ok(PayloadItem::Eof)) | None => {
                    this.state = ReadState::Finished;
                    return Poll::Ready(None);
                }
                Some(Err(e)) => {
                    let error = if this.connection.connection().is_closed() { ClientError::ConnectionClosed } else { e.into() };
                    return this.fail(error);
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.state, ReadState::Finished | ReadState::Failed)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("connection", self.connection.connection())
            .field("limit", &self.limit)
            .field("delivered", &self.delivered)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
