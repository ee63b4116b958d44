//! Request method vocabulary.
//!
//! The `http::Method` type is used as is; this module restricts it to the nine methods
//! defined by RFC 9110 and adds the body-related classification the client needs.

use http::Method;

use crate::protocol::ParseError;

const STANDARD_METHODS: [Method; 9] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::CONNECT,
    Method::OPTIONS,
    Method::TRACE,
];

/// Parses a method name, normalising it to upper case.
///
/// Only the standard methods are accepted, extension methods are rejected.
///
/// # Errors
///
/// Returns [`ParseError::InvalidMethod`] for empty or unknown method names.
pub fn parse_method(name: &str) -> Result<Method, ParseError> {
    let upper = name.trim().to_ascii_uppercase();
    STANDARD_METHODS
        .iter()
        .find(|method| method.as_str() == upper)
        .cloned()
        .ok_or_else(|| ParseError::invalid_method(name))
}

/// Body semantics of a request method.
pub trait MethodExt {
    /// Whether the method is one of the nine standard methods.
    fn is_standard(&self) -> bool;

    /// Whether a request with this method may carry a body at all.
    fn request_body_allowed(&self) -> bool;

    /// Whether a request with this method usually carries a body.
    ///
    /// Used to decide if an empty body is still announced with `content-length: 0`.
    fn request_body_common(&self) -> bool;

    /// Whether a response to this method may carry a body.
    fn response_body_allowed(&self) -> bool;
}

impl MethodExt for Method {
    fn is_standard(&self) -> bool {
        STANDARD_METHODS.contains(self)
    }

    fn request_body_allowed(&self) -> bool {
        *self != Method::TRACE
    }

    fn request_body_common(&self) -> bool {
        matches!(*self, Method::POST | Method::PUT | Method::PATCH)
    }

    fn response_body_allowed(&self) -> bool {
        *self != Method::HEAD
    }
}
