//! Redirect following.
//!
//! A [`RedirectPolicy`] looks at the hops followed so far and decides whether to follow
//! the next one. Requests without a policy never follow redirects; the handler gets the
//! redirect response itself.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use http::Method;
use http::header::{
    AUTHORIZATION, CONTENT_ENCODING, CONTENT_LANGUAGE, CONTENT_LENGTH, CONTENT_LOCATION, CONTENT_TYPE, COOKIE, HOST,
    HeaderMap, PROXY_AUTHORIZATION, TRANSFER_ENCODING,
};
use micro_fetch_http::protocol::Status;
use thiserror::Error;
use url::Url;

use crate::ClientError;
use crate::pool::Origin;

/// Upper bound of followed redirects per operation, whatever the policy says.
pub const MAX_REDIRECTS: usize = 10;

/// One followed redirect: the request that was answered with a redirect status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectHop {
    method: Method,
    url: Url,
    status: Status,
}

impl RedirectHop {
    #[must_use]
    pub fn new(method: Method, url: Url, status: Status) -> Self {
        Self { method, url, status }
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn status(&self) -> &Status {
        &self.status
    }
}

/// The hops of the current operation, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectState {
    hops: Vec<RedirectHop>,
}

impl RedirectState {
    #[must_use]
    pub fn hops(&self) -> &[RedirectHop] {
        &self.hops
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&RedirectHop> {
        self.hops.last()
    }

    pub(crate) fn push(&mut self, hop: RedirectHop) {
        self.hops.push(hop);
    }
}

/// Why a [`RedirectPolicy`] refused to follow.
#[derive(Debug, Error)]
pub enum RedirectError {
    /// Stop here and hand the redirect response to the handler.
    #[error("use last response")]
    UseLastResponse,

    #[error("stopped after {max} redirects")]
    TooManyRedirects { max: usize },

    #[error(transparent)]
    Other(Box<dyn StdError + Send + Sync>),
}

type PolicyFn = dyn Fn(&RedirectState) -> Result<(), RedirectError> + Send + Sync;

/// Decides whether the redirect just received is followed.
///
/// The policy runs with the state already holding the new hop, before the handler sees
/// anything; `Ok(())` follows it.
///
/// ```
/// use micro_fetch::redirect::{RedirectError, RedirectPolicy};
///
/// // follow at most three hops, and never leave the first host
/// let policy = RedirectPolicy::custom(|state| {
///     if state.len() > 3 {
///         return Err(RedirectError::TooManyRedirects { max: 3 });
///     }
///     let first = state.hops()[0].url().host_str();
///     match state.last() {
///         Some(hop) if hop.url().host_str() != first => Err(RedirectError::UseLastResponse),
///         _ => Ok(()),
///     }
/// });
/// # drop(policy);
/// ```
#[derive(Clone)]
pub struct RedirectPolicy {
    inner: Arc<PolicyFn>,
}

impl RedirectPolicy {
    pub fn custom<F>(policy: F) -> Self
    where
        F: Fn(&RedirectState) -> Result<(), RedirectError> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(policy) }
    }

    /// Follows up to `max` hops, then fails with [`RedirectError::TooManyRedirects`].
    #[must_use]
    pub fn limited(max: usize) -> Self {
        Self::custom(move |state| if state.len() > max { Err(RedirectError::TooManyRedirects { max }) } else { Ok(()) })
    }

    pub(crate) fn check(&self, state: &RedirectState) -> Result<(), RedirectError> {
        (self.inner)(state)
    }
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::limited(MAX_REDIRECTS)
    }
}

impl fmt::Debug for RedirectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedirectPolicy").finish_non_exhaustive()
    }
}

/// The request that follows a redirect response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FollowUp {
    pub(crate) method: Method,
    pub(crate) url: Url,
    /// the body is sent again, restarted from its source
    pub(crate) keep_body: bool,
    pub(crate) cross_origin: bool,
}

impl FollowUp {
    /// Builds the follow-up of a `status` redirect of `method url` to `location`.
    pub(crate) fn new(method: &Method, url: &Url, status: &Status, location: &str) -> Result<Self, ClientError> {
        let next_url = url.join(location).map_err(|e| ClientError::invalid_redirect(format!("{location}: {e}")))?;
        let next_origin = Origin::from_url(&next_url).map_err(|e| ClientError::invalid_redirect(format!("{location}: {e}")))?;
        let cross_origin = Origin::from_url(url).map_or(true, |origin| origin != next_origin);

        let next_method = match status.code() {
            303 if *method != Method::HEAD => Method::GET,
            301 | 302 if *method == Method::POST => Method::GET,
            _ => method.clone(),
        };
        let keep_body = next_method == *method;

        Ok(Self { method: next_method, url: next_url, keep_body, cross_origin })
    }

    /// Adjusts the request headers for the follow-up request.
    pub(crate) fn apply_to(&self, headers: &mut HeaderMap) {
        if !self.keep_body {
            for name in [CONTENT_TYPE, CONTENT_LENGTH, CONTENT_ENCODING, CONTENT_LANGUAGE, CONTENT_LOCATION, TRANSFER_ENCODING] {
                headers.remove(name);
            }
        }
        if self.cross_origin {
            for name in [AUTHORIZATION, PROXY_AUTHORIZATION, COOKIE, HOST] {
                headers.remove(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn url(str: &str) -> Url {
        Url::parse(str).unwrap()
    }

    fn status(code: u16) -> Status {
        Status::new(code).unwrap()
    }

    fn state(len: usize) -> RedirectState {
        let mut state = RedirectState::default();
        for _ in 0..len {
            state.push(RedirectHop::new(Method::GET, url("http://example.com/"), status(302)));
        }
        state
    }

    #[test]
    fn limited_policy() {
        let policy = RedirectPolicy::limited(2);
        assert!(policy.check(&state(1)).is_ok());
        assert!(policy.check(&state(2)).is_ok());
        assert!(matches!(policy.check(&state(3)), Err(RedirectError::TooManyRedirects { max: 2 })));
    }

    #[test]
    fn default_policy_allows_max_redirects() {
        let policy = RedirectPolicy::default();
        assert!(policy.check(&state(MAX_REDIRECTS)).is_ok());
        assert!(policy.check(&state(MAX_REDIRECTS + 1)).is_err());
    }

    #[test]
    fn relative_location_keeps_origin() {
        let follow = FollowUp::new(&Method::GET, &url("http://example.com/a/b"), &status(301), "../c?x=1").unwrap();
        assert_eq!(follow.url.as_str(), "http://example.com/c?x=1");
        assert_eq!(follow.method, Method::GET);
        assert!(follow.keep_body);
        assert!(!follow.cross_origin);
    }

    #[test]
    fn see_other_switches_to_get() {
        let follow = FollowUp::new(&Method::PUT, &url("http://example.com/"), &status(303), "/done").unwrap();
        assert_eq!(follow.method, Method::GET);
        assert!(!follow.keep_body);

        let follow = FollowUp::new(&Method::HEAD, &url("http://example.com/"), &status(303), "/done").unwrap();
        assert_eq!(follow.method, Method::HEAD);
    }

    #[test]
    fn found_switches_post_only() {
        let follow = FollowUp::new(&Method::POST, &url("http://example.com/"), &status(302), "/next").unwrap();
        assert_eq!(follow.method, Method::GET);
        assert!(!follow.keep_body);

        let follow = FollowUp::new(&Method::PUT, &url("http://example.com/"), &status(301), "/next").unwrap();
        assert_eq!(follow.method, Method::PUT);
        assert!(follow.keep_body);
    }

    #[test]
    fn temporary_redirect_keeps_method_and_body() {
        for code in [307, 308] {
            let follow = FollowUp::new(&Method::POST, &url("http://example.com/"), &status(code), "/upload").unwrap();
            assert_eq!(follow.method, Method::POST);
            assert!(follow.keep_body);
        }
    }

    #[test]
    fn cross_origin_strips_credentials() {
        let follow = FollowUp::new(&Method::POST, &url("http://example.com/"), &status(302), "https://other.example/").unwrap();
        assert!(follow.cross_origin);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        headers.insert(COOKIE, HeaderValue::from_static("session=1"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert("x-trace", HeaderValue::from_static("abc"));
        follow.apply_to(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-trace").unwrap(), "abc");
    }

    #[test]
    fn unusable_location() {
        assert!(matches!(
            FollowUp::new(&Method::GET, &url("http://example.com/"), &status(302), "ftp://example.com/file"),
            Err(ClientError::InvalidRedirect { .. })
        ));
        assert!(matches!(
            FollowUp::new(&Method::GET, &url("http://example.com/"), &status(302), "http://[::1"),
            Err(ClientError::InvalidRedirect { .. })
        ));
    }
}
