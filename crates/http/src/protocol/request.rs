//! Outgoing request head.
//!
//! Wraps an `http::Request<()>`: the URI is kept in absolute form so the transport can
//! derive the origin, the encoder writes the origin-form target on the wire.

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

use crate::protocol::MethodExt;

/// The head of a request about to be written to a connection.
#[derive(Debug, Clone)]
pub struct RequestHead {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHead {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHead {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHead {
    /// Consumes the head and returns the inner `Request<()>`.
    #[must_use]
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    #[must_use]
    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// The request target as written on the request line.
    ///
    /// `CONNECT` uses the authority form, everything else the origin form.
    #[must_use]
    pub fn target(&self) -> &str {
        let uri = self.uri();
        if self.method() == Method::CONNECT {
            return uri.authority().map_or("", http::uri::Authority::as_str);
        }
        match uri.path_and_query() {
            Some(path_and_query) if !path_and_query.as_str().is_empty() => path_and_query.as_str(),
            _ => "/",
        }
    }

    /// Whether an empty body is still announced with `content-length: 0`.
    #[must_use]
    pub fn announce_empty_body(&self) -> bool {
        self.method().request_body_common()
    }
}

impl From<Parts> for RequestHead {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHead {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_form_target() {
        let head = RequestHead::from(Request::get("http://example.com/a/b?x=1").body(()).unwrap());
        assert_eq!(head.target(), "/a/b?x=1");

        let head = RequestHead::from(Request::get("http://example.com").body(()).unwrap());
        assert_eq!(head.target(), "/");
    }

    #[test]
    fn authority_form_for_connect() {
        let head = RequestHead::from(Request::connect("http://example.com:443").body(()).unwrap());
        assert_eq!(head.target(), "example.com:443");
    }

    #[test]
    fn empty_body_announcement() {
        let head = RequestHead::from(Request::post("http://example.com/").body(()).unwrap());
        assert!(head.announce_empty_body());

        let head = RequestHead::from(Request::get("http://example.com/").body(()).unwrap());
        assert!(!head.announce_empty_body());
    }
}
