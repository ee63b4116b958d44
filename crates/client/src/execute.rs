//! The execution engine: connection acquisition, transmission, the redirect loop and
//! handler invocation.

use http::header::{COOKIE, HOST, LOCATION, SET_COOKIE};
use http::{HeaderMap, HeaderValue, Method, Uri};
use micro_fetch_http::connection::HttpConnection;
use micro_fetch_http::protocol::{MethodExt, RequestHead, ResponseHead, Status};
use tracing::{debug, trace, warn};
use url::Url;

use crate::body::RequestBody;
use crate::jar::CookieJar;
use crate::pool::{Connector, Origin, Pool};
use crate::redirect::{FollowUp, MAX_REDIRECTS, RedirectError, RedirectHop, RedirectPolicy, RedirectState};
use crate::response::ResponseBody;
use crate::{ClientError, Context, Handler, HandlerState, Request};

/// Upper bound of body bytes read to put an abandoned response's connection back to use.
pub const DRAIN_LIMIT: u64 = 64 * 1024;

impl Request {
    /// Performs the request and hands the final response to `handler`.
    ///
    /// Redirects are followed as the redirect policy allows, at most [`MAX_REDIRECTS`]
    /// of them. The request's timeout and the deadline of `ctx` bound everything,
    /// including the handler reading the body. Connections go back to the pool when
    /// their response was read to the end (or could be drained cheaply), and are closed
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Any [`ClientError`]; errors returned by `handler` are passed through unchanged.
    pub async fn execute<H: Handler>(self, ctx: &Context, handler: H) -> Result<H::Output, ClientError> {
        let Request {
            mut method,
            url,
            mut headers,
            mut trailers,
            mut body,
            limit_bytes,
            timeout,
            redirect_policy,
            pool,
            connector,
            jar,
            error,
        } = self;

        if let Some(error) = error {
            return Err(error);
        }
        let Some(mut url) = url else {
            return Err(ClientError::invalid_request("missing url"));
        };
        if !method.is_standard() {
            return Err(ClientError::invalid_request(format!("unsupported method: {method}")));
        }

        let ctx = ctx.for_operation(timeout);
        let limit = u64::try_from(limit_bytes).ok();
        let transport = Transport { pool: pool.as_deref(), connector: connector.as_ref() };
        let mut redirects = RedirectState::default();

        loop {
            let origin = Origin::from_url(&url)?;
            let request_head = build_head(&method, &url, &headers, jar.as_deref())?;
            let request_trailers = (!trailers.is_empty()).then(|| trailers.clone());

            let request_body = match body.as_mut() {
                Some(source) => ctx.bounded(source.prepare(request_trailers)).await?,
                None => RequestBody::empty(request_trailers),
            };

            let mut connection = ctx.bounded(transport.acquire(&origin)).await?;

            let exchange = ctx.bounded(async { Ok(connection.round_trip(request_head, request_body).await?) }).await;
            let (response_head, _) = match exchange {
                Ok(response) => response,
                Err(e) => {
                    warn!(conn_id = connection.connection().id(), %origin, cause = %e, "request failed");
                    transport.discard(&origin, connection);
                    return Err(e);
                }
            };

            let status = response_head.status().clone();
            debug!(conn_id = connection.connection().id(), %origin, %method, %status, hops = redirects.len(), "received response head");

            if let Some(jar) = jar.as_deref() {
                store_cookies(jar, &url, &response_head);
            }

            if let Some(policy) = redirect_policy.as_ref()
                && status.is_redirect()
                && let Some(location) = response_head.header().get(LOCATION.as_str())
            {
                let decision = decide(policy, &mut redirects, &method, &url, &status, location);
                match decision {
                    Ok(Some(follow_up)) => {
                        transport.release(&origin, connection, &ctx).await;
                        debug!(%status, location = follow_up.url.as_str(), hops = redirects.len(), "follow redirect");

                        follow_up.apply_to(&mut headers);
                        if !follow_up.keep_body {
                            body = None;
                            trailers.clear();
                        }
                        method = follow_up.method;
                        url = follow_up.url;
                        continue;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        transport.release(&origin, connection, &ctx).await;
                        return Err(e);
                    }
                }
            }

            let response_body = ResponseBody::new(connection, method.clone(), limit, &ctx);
            let mut state = HandlerState::new(method, url, response_head, response_body);
            let result = ctx.bounded(handler.read_http(&mut state)).await;

            transport.release(&origin, state.into_connection(), &ctx).await;
            return result;
        }
    }
}

/// Runs the redirect policy on the hop just received.
///
/// `Ok(Some(_))` follows it, `Ok(None)` hands the response to the handler.
fn decide(
    policy: &RedirectPolicy,
    redirects: &mut RedirectState,
    method: &Method,
    url: &Url,
    status: &Status,
    location: &str,
) -> Result<Option<FollowUp>, ClientError> {
    redirects.push(RedirectHop::new(method.clone(), url.clone(), status.clone()));

    let decision = if redirects.len() > MAX_REDIRECTS {
        Err(RedirectError::TooManyRedirects { max: MAX_REDIRECTS })
    } else {
        policy.check(redirects)
    };

    match decision {
        Ok(()) => FollowUp::new(method, url, status, location).map(Some),
        Err(RedirectError::UseLastResponse) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn build_head(method: &Method, url: &Url, headers: &HeaderMap, jar: Option<&dyn CookieJar>) -> Result<RequestHead, ClientError> {
    let mut target = url.clone();
    target.set_fragment(None);
    let uri: Uri = target.as_str().parse().map_err(|e| ClientError::invalid_request(format!("{target}: {e}")))?;

    let mut request = http::Request::new(());
    *request.method_mut() = method.clone();
    *request.uri_mut() = uri;
    *request.headers_mut() = headers.clone();

    if !request.headers().contains_key(HOST) {
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(ClientError::invalid_request(format!("missing host: {url}"))),
        };
        let value = HeaderValue::try_from(host).map_err(ClientError::invalid_request)?;
        request.headers_mut().insert(HOST, value);
    }

    if let Some(cookies) = jar.and_then(|jar| jar.cookies(url)) {
        let cookies = match request.headers().get(COOKIE).and_then(|value| value.to_str().ok()) {
            Some(existing) => format!("{existing}; {cookies}"),
            None => cookies,
        };
        let value = HeaderValue::try_from(cookies).map_err(ClientError::invalid_request)?;
        request.headers_mut().insert(COOKIE, value);
    }

    Ok(RequestHead::from(request))
}

fn store_cookies(jar: &dyn CookieJar, url: &Url, head: &ResponseHead) {
    let cookies: Vec<String> = head.header().get_all(SET_COOKIE.as_str()).into_iter().map(str::to_string).collect();
    if !cookies.is_empty() {
        jar.set_cookies(url, cookies);
    }
}

/// Where connections come from and go back to.
struct Transport<'a> {
    pool: Option<&'a dyn Pool>,
    connector: &'a dyn Connector,
}

impl Transport<'_> {
    async fn acquire(&self, origin: &Origin) -> Result<HttpConnection, ClientError> {
        let acquired = match self.pool {
            Some(pool) => pool.acquire(origin).await,
            None => self.connector.connect(origin).await,
        };
        acquired.map_err(|e| ClientError::connection_acquisition_failed(origin, e))
    }

    /// Drains what is left of the response within bounds, then pools or closes the
    /// connection.
    async fn release(&self, origin: &Origin, mut connection: HttpConnection, ctx: &Context) {
        if !connection.is_body_done() {
            let drained = ctx.bounded(async { Ok(connection.skip_body(DRAIN_LIMIT).await) }).await;
            trace!(conn_id = connection.connection().id(), drained = matches!(drained, Ok(true)), "drain abandoned response body");
        }

        let reusable = connection.is_reusable();
        match self.pool {
            Some(pool) => pool.release(origin, connection, reusable),
            None => connection.connection().close(),
        }
    }

    fn discard(&self, origin: &Origin, connection: HttpConnection) {
        connection.connection().close();
        if let Some(pool) = self.pool {
            pool.release(origin, connection, false);
        }
    }
}
