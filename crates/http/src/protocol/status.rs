use std::fmt;

use http::StatusCode;

use crate::protocol::ParseError;

/// A response status: a three digit code plus the reason phrase the server sent, if any.
///
/// Classification only looks at the numeric code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Status {
    code: StatusCode,
    reason: Option<String>,
}

impl Status {
    /// Creates a status without a reason phrase.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidStatus`] when `code` is outside `100..=999`.
    pub fn new(code: u16) -> Result<Self, ParseError> {
        let Ok(status_code) = StatusCode::from_u16(code) else {
            return Err(ParseError::InvalidStatus(code));
        };
        Ok(Self { code: status_code, reason: None })
    }

    /// Creates a status carrying the reason phrase received on the wire.
    ///
    /// An empty reason is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidStatus`] when `code` is outside `100..=999`.
    pub fn with_reason<S: Into<String>>(code: u16, reason: S) -> Result<Self, ParseError> {
        let reason = reason.into();
        let mut status = Self::new(code)?;
        if !reason.is_empty() {
            status.reason = Some(reason);
        }
        Ok(status)
    }

    #[inline]
    #[must_use]
    pub fn code(&self) -> u16 {
        self.code.as_u16()
    }

    #[inline]
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        self.code
    }

    /// The received reason phrase, else the canonical one, else an empty string.
    #[must_use]
    pub fn text(&self) -> &str {
        match &self.reason {
            Some(reason) => reason,
            None => self.code.canonical_reason().unwrap_or(""),
        }
    }

    /// Whether a response with this status may carry a body.
    #[must_use]
    pub fn permits_response_body(&self) -> bool {
        !(self.is_informational() || self.code() == 204 || self.code() == 304)
    }

    #[must_use]
    pub fn is_informational(&self) -> bool {
        self.code.is_informational()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Whether this is one of the redirect statuses a client follows: 301, 302, 303, 307, 308.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        matches!(self.code(), 301 | 302 | 303 | 307 | 308)
    }

    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.code.is_client_error()
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.code.is_server_error()
    }

    #[must_use]
    pub fn is_not_modified(&self) -> bool {
        self.code == StatusCode::NOT_MODIFIED
    }
}

impl From<StatusCode> for Status {
    fn from(code: StatusCode) -> Self {
        Self { code, reason: None }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.text();
        if text.is_empty() { write!(f, "{}", self.code()) } else { write!(f, "{} {text}", self.code()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range() {
        assert!(matches!(Status::new(99), Err(ParseError::InvalidStatus(99))));
        assert!(matches!(Status::new(1000), Err(ParseError::InvalidStatus(1000))));
        assert!(Status::new(100).is_ok());
        assert!(Status::new(999).is_ok());
    }

    #[test]
    fn classification_follows_hundreds_digit() {
        for code in 100..=999 {
            let status = Status::new(code).unwrap();
            assert_eq!(status.is_success(), (200..=299).contains(&code));
            assert_eq!(status.is_client_error(), (400..=499).contains(&code));
            assert_eq!(status.is_server_error(), (500..=599).contains(&code));
            assert_eq!(status.is_not_modified(), code == 304);

            let classes = [status.is_success(), status.is_client_error(), status.is_server_error()];
            assert!(classes.iter().filter(|c| **c).count() <= 1);
            if status.is_not_modified() {
                assert!(!status.is_success());
            }
        }
    }

    #[test]
    fn text_and_display() {
        let status = Status::new(200).unwrap();
        assert_eq!(status.text(), "OK");
        assert_eq!(status.to_string(), "200 OK");

        let status = Status::with_reason(404, "Nope").unwrap();
        assert_eq!(status.text(), "Nope");
        assert_eq!(status.to_string(), "404 Nope");

        let status = Status::with_reason(299, "").unwrap();
        assert_eq!(status.text(), "");
        assert_eq!(status.to_string(), "299");
    }

    #[test]
    fn response_body_permission() {
        assert!(!Status::new(101).unwrap().permits_response_body());
        assert!(!Status::new(204).unwrap().permits_response_body());
        assert!(!Status::new(304).unwrap().permits_response_body());
        assert!(Status::new(200).unwrap().permits_response_body());
        assert!(Status::new(404).unwrap().permits_response_body());
    }

    #[test]
    fn redirect_class() {
        for code in [301, 302, 303, 307, 308] {
            assert!(Status::new(code).unwrap().is_redirect());
        }
        for code in [300, 304, 305, 306, 200] {
            assert!(!Status::new(code).unwrap().is_redirect());
        }
    }
}
