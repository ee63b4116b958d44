//! Request description and its builder methods.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use micro_fetch_http::protocol::parse_method;
use serde::Serialize;
use tokio::io::{AsyncRead, DuplexStream};
use url::Url;

use crate::ClientError;
use crate::body::BodySource;
use crate::jar::CookieJar;
use crate::pool::{Connector, Pool, TcpConnector, default_pool};
use crate::redirect::RedirectPolicy;

/// Default cap on the response body bytes handed to a handler: 128 MiB.
pub const DEFAULT_LIMIT_BYTES: i64 = 128 * 1024 * 1024;

/// Everything needed to perform one HTTP operation, including its redirect chain.
///
/// Built by chaining option methods, then consumed by
/// [`execute`](Request::execute), so a request can't be reused or modified once it
/// runs. Invalid options (a malformed header, an unknown method) don't fail the chain;
/// the first one is reported by `execute` as [`ClientError::InvalidRequest`].
///
/// ```
/// use std::time::Duration;
/// use micro_fetch::Request;
/// use micro_fetch::redirect::RedirectPolicy;
///
/// let request = Request::new("post", "http://127.0.0.1:8080/items")
///     .set_header("accept", "application/json")
///     .add_header("x-tag", "a")
///     .add_header("x-tag", "b")
///     .body("{\"name\":\"micro\"}")
///     .timeout(Duration::from_secs(5))
///     .redirect_policy(RedirectPolicy::default());
///
/// assert_eq!(request.method(), "POST");
/// assert_eq!(request.headers().get_all("x-tag").iter().count(), 2);
/// ```
pub struct Request {
    pub(crate) method: Method,
    pub(crate) url: Option<Url>,
    pub(crate) headers: HeaderMap,
    pub(crate) trailers: HeaderMap,
    pub(crate) body: Option<BodySource>,
    pub(crate) limit_bytes: i64,
    pub(crate) timeout: Option<Duration>,
    pub(crate) redirect_policy: Option<RedirectPolicy>,
    pub(crate) pool: Option<Arc<dyn Pool>>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) jar: Option<Arc<dyn CookieJar>>,
    pub(crate) error: Option<ClientError>,
}

impl Request {
    /// A request for `method` (case-insensitive) on `url`.
    ///
    /// It follows no redirects and uses the [`default_pool`] until told otherwise.
    pub fn new(method: &str, url: &str) -> Self {
        let mut request = Self {
            method: Method::GET,
            url: None,
            headers: HeaderMap::new(),
            trailers: HeaderMap::new(),
            body: None,
            limit_bytes: DEFAULT_LIMIT_BYTES,
            timeout: None,
            redirect_policy: None,
            pool: Some(default_pool()),
            connector: Arc::new(TcpConnector),
            jar: None,
            error: None,
        };

        match parse_method(method) {
            Ok(method) => request.method = method,
            Err(e) => request.fail(e),
        }
        match Url::parse(url) {
            Ok(url) => request.url = Some(url),
            Err(e) => request.fail(format!("{url}: {e}")),
        }
        request
    }

    pub fn get(url: &str) -> Self {
        Self::new("GET", url)
    }

    pub fn head(url: &str) -> Self {
        Self::new("HEAD", url)
    }

    pub fn post(url: &str) -> Self {
        Self::new("POST", url)
    }

    pub fn put(url: &str) -> Self {
        Self::new("PUT", url)
    }

    pub fn delete(url: &str) -> Self {
        Self::new("DELETE", url)
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn trailers(&self) -> &HeaderMap {
        &self.trailers
    }

    /// Replaces every value of header `key`.
    #[must_use]
    pub fn set_header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        K::Error: Into<http::Error>,
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        if let Some((key, value)) = self.field(key, value) {
            self.headers.insert(key, value);
        }
        self
    }

    /// Appends a value to header `key`, keeping the existing ones.
    #[must_use]
    pub fn add_header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        K::Error: Into<http::Error>,
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        if let Some((key, value)) = self.field(key, value) {
            self.headers.append(key, value);
        }
        self
    }

    /// Replaces every value of trailer field `key`. Trailers make the body go chunked.
    #[must_use]
    pub fn set_trailer<K, V>(mut self, key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        K::Error: Into<http::Error>,
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        if let Some((key, value)) = self.field(key, value) {
            self.trailers.insert(key, value);
        }
        self
    }

    #[must_use]
    pub fn add_trailer<K, V>(mut self, key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        K::Error: Into<http::Error>,
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        if let Some((key, value)) = self.field(key, value) {
            self.trailers.append(key, value);
        }
        self
    }

    /// Sets the body. In-memory values are always restartable; see [`BodySource`] for
    /// readers.
    #[must_use]
    pub fn body<B: Into<BodySource>>(mut self, body: B) -> Self {
        self.body = Some(body.into());
        self
    }

    /// A one-shot body read from `reader`. Redirects that need to resend it fail with
    /// [`ClientError::BodyNotRestartable`].
    #[must_use]
    pub fn body_reader<R>(self, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.body(BodySource::reader(reader))
    }

    /// A body produced afresh by `factory` for every transmission attempt.
    #[must_use]
    pub fn restartable_body<F, R>(self, factory: F) -> Self
    where
        F: FnMut() -> io::Result<R> + Send + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.body(BodySource::restartable(factory))
    }

    /// A body written by `write`, which is called once per transmission attempt with the
    /// stream to write into. See [`BodySource::writer`].
    #[must_use]
    pub fn body_fn<F, Fut>(self, write: F) -> Self
    where
        F: FnMut(DuplexStream) -> Fut + Send + 'static,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
    {
        self.body(BodySource::writer(write))
    }

    /// Sends `form` as an `application/x-www-form-urlencoded` body.
    #[must_use]
    pub fn form_values<T: Serialize + ?Sized>(self, form: &T) -> Self {
        match serde_urlencoded::to_string(form) {
            Ok(encoded) => self.set_header(CONTENT_TYPE, mime::APPLICATION_WWW_FORM_URLENCODED.as_ref()).body(Bytes::from(encoded)),
            Err(e) => self.failed(e),
        }
    }

    /// Sends `value` as an `application/json` body.
    #[must_use]
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(encoded) => self.set_header(CONTENT_TYPE, mime::APPLICATION_JSON.as_ref()).body(encoded),
            Err(e) => self.failed(e),
        }
    }

    /// Caps the response body bytes handed to the handler; negative means unlimited.
    #[must_use]
    pub fn limit_bytes(mut self, limit: i64) -> Self {
        self.limit_bytes = limit;
        self
    }

    /// Bounds the whole operation: every hop, and the handler reading the final body.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Follows redirects as `policy` allows.
    #[must_use]
    pub fn redirect_policy(mut self, policy: RedirectPolicy) -> Self {
        self.redirect_policy = Some(policy);
        self
    }

    /// Hands redirect responses to the handler instead of following them (the default).
    #[must_use]
    pub fn no_redirects(mut self) -> Self {
        self.redirect_policy = None;
        self
    }

    #[must_use]
    pub fn pool(mut self, pool: Arc<dyn Pool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Dials a fresh connection for every hop and closes it afterwards.
    #[must_use]
    pub fn no_pool(mut self) -> Self {
        self.pool = None;
        self
    }

    /// The connector used when no pool is set.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    #[must_use]
    pub fn jar(mut self, jar: Arc<dyn CookieJar>) -> Self {
        self.jar = Some(jar);
        self
    }

    fn field<K, V>(&mut self, key: K, value: V) -> Option<(HeaderName, HeaderValue)>
    where
        K: TryInto<HeaderName>,
        K::Error: Into<http::Error>,
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        let key = match key.try_into() {
            Ok(key) => key,
            Err(e) => {
                let error: http::Error = e.into();
                self.fail(error);
                return None;
            }
        };
        match value.try_into() {
            Ok(value) => Some((key, value)),
            Err(e) => {
                let error: http::Error = e.into();
                self.fail(error);
                None
            }
        }
    }

    /// Records the first invalid option.
    fn fail<E: ToString>(&mut self, error: E) {
        if self.error.is_none() {
            self.error = Some(ClientError::invalid_request(error));
        }
    }

    fn failed<E: ToString>(mut self, error: E) -> Self {
        self.fail(error);
        self
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("headers", &self.headers)
            .field("trailers", &self.trailers)
            .field("body", &self.body)
            .field("limit_bytes", &self.limit_bytes)
            .field("timeout", &self.timeout)
            .field("redirect_policy", &self.redirect_policy)
            .field("pool", &self.pool)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_is_normalized() {
        let request = Request::new("patch", "http://example.com/");
        assert_eq!(request.method(), Method::PATCH);
        assert!(request.error.is_none());
    }

    #[test]
    fn invalid_options_are_deferred() {
        let request = Request::new("FETCH", "http://example.com/");
        assert!(matches!(request.error, Some(ClientError::InvalidRequest { .. })));

        let request = Request::get("not a url");
        assert!(matches!(request.error, Some(ClientError::InvalidRequest { .. })));

        let request = Request::get("http://example.com/").set_header("bad header", "v").set_header("x-ok", "v");
        assert!(matches!(request.error, Some(ClientError::InvalidRequest { .. })));
        assert_eq!(request.headers().get("x-ok").unwrap(), "v");
    }

    #[test]
    fn set_replaces_and_add_appends() {
        let request = Request::get("http://example.com/")
            .add_header("Accept", "text/html")
            .add_header("accept", "text/plain")
            .set_header("X-Id", "1")
            .set_header("x-id", "2")
            .add_trailer("x-checksum", "a")
            .set_trailer("X-Checksum", "b");

        let accept: Vec<_> = request.headers().get_all("accept").iter().collect();
        assert_eq!(accept, ["text/html", "text/plain"]);
        assert_eq!(request.headers().get_all("x-id").iter().count(), 1);
        assert_eq!(request.headers().get("x-id").unwrap(), "2");
        assert_eq!(request.trailers().get("x-checksum").unwrap(), "b");
    }

    #[test]
    fn defaults() {
        let request = Request::get("http://example.com/");
        assert_eq!(request.limit_bytes, DEFAULT_LIMIT_BYTES);
        assert!(request.redirect_policy.is_none());
        assert!(request.pool.is_some());
        assert!(request.timeout.is_none());
        assert!(request.body.is_none());
    }

    #[test]
    fn form_values_sets_content_type() {
        #[derive(Serialize)]
        struct Login<'a> {
            user: &'a str,
            note: &'a str,
        }

        let request = Request::post("http://example.com/login").form_values(&Login { user: "zava", note: "a b&c" });
        assert_eq!(request.headers().get(CONTENT_TYPE).unwrap(), "application/x-www-form-urlencoded");
        assert!(request.body.is_some());
        assert!(request.error.is_none());
    }
}
