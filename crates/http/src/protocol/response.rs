//! Incoming response head.

use http::Version;

use crate::protocol::{Header, Status};

/// Status line and header fields of a response, as read off a connection.
///
/// The body is read separately through the connection's payload stream.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    version: Version,
    status: Status,
    header: Header,
}

impl ResponseHead {
    #[must_use]
    pub fn new(version: Version, status: Status, header: Header) -> Self {
        Self { version, status, header }
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

    /// Whether the peer lets the connection stay open after this response.
    ///
    /// HTTP/1.1 is persistent unless `connection: close`, HTTP/1.0 only with
    /// `connection: keep-alive`.
    #[must_use]
    pub fn keep_alive(&self) -> bool {
        match self.version {
            Version::HTTP_11 => !self.header.contains_token("connection", "close"),
            Version::HTTP_10 => self.header.contains_token("connection", "keep-alive"),
            _ => false,
        }
    }

    #[must_use]
    pub fn into_parts(self) -> (Version, Status, Header) {
        (self.version, self.status, self.header)
    }
}
