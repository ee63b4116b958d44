use std::error::Error as StdError;
use std::io;

use micro_fetch_http::protocol::{HttpError, ParseError, SendError, Status};
use thiserror::Error;
use url::Url;

use crate::pool::Origin;
use crate::redirect::RedirectError;

/// Everything [`Request::execute`](crate::Request::execute) can fail with.
///
/// None of these are retried by the engine; bodies are restartable so that callers can.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("failed to acquire a connection to {origin}: {source}")]
    ConnectionAcquisitionFailed {
        origin: String,
        #[source]
        source: io::Error,
    },

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("operation canceled")]
    Canceled,

    #[error("request body can't be sent again")]
    BodyNotRestartable,

    #[error("response body exceeds the limit of {limit} bytes")]
    BodyTooLarge { limit: u64 },

    #[error("stopped after {max} redirects")]
    TooManyRedirects { max: usize },

    #[error("trailer read before the response body was drained")]
    TrailerBeforeBodyDrained,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("invalid redirect location: {reason}")]
    InvalidRedirect { reason: String },

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error("redirect policy error: {source}")]
    Redirect { source: Box<dyn StdError + Send + Sync> },

    #[error("handler error: {source}")]
    Handler { source: Box<dyn StdError + Send + Sync> },

    #[error("json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("response error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("request error: {source}")]
    Send {
        #[from]
        source: SendError,
    },
}

impl ClientError {
    pub fn invalid_request<S: ToString>(str: S) -> Self {
        Self::InvalidRequest { reason: str.to_string() }
    }

    pub fn invalid_redirect<S: ToString>(str: S) -> Self {
        Self::InvalidRedirect { reason: str.to_string() }
    }

    pub fn connection_acquisition_failed(origin: &Origin, source: io::Error) -> Self {
        Self::ConnectionAcquisitionFailed { origin: origin.to_string(), source }
    }

    pub fn handler<E: Into<Box<dyn StdError + Send + Sync>>>(error: E) -> Self {
        Self::Handler { source: error.into() }
    }

    /// Whether the operation ran out of time or was canceled by its context.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::DeadlineExceeded | Self::Canceled)
    }
}

impl From<HttpError> for ClientError {
    fn from(error: HttpError) -> Self {
        match error {
            HttpError::Parse { source } => source.into(),
            HttpError::Send { source } => source.into(),
        }
    }
}

impl From<RedirectError> for ClientError {
    fn from(error: RedirectError) -> Self {
        match error {
            RedirectError::TooManyRedirects { max } => Self::TooManyRedirects { max },
            RedirectError::UseLastResponse => Self::Redirect { source: Box::new(RedirectError::UseLastResponse) },
            RedirectError::Other(source) => Self::Redirect { source },
        }
    }
}

/// A response whose status the handler did not accept.
///
/// Produced by handlers such as [`json`](crate::extract::json), never by the engine itself.
#[derive(Debug, Error)]
#[error("unexpected status {status} from {url}")]
pub struct StatusError {
    status: Status,
    url: Url,
}

impl StatusError {
    #[must_use]
    pub fn new(status: Status, url: Url) -> Self {
        Self { status, url }
    }

    #[must_use]
    pub fn status(&self) -> &Status {
        &self.status
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}
