//! Transport collaborators: dialing connections and keeping idle ones around.
//!
//! - [`Connector`]: opens a new [`HttpConnection`] to an [`Origin`]; implement it to bring
//!   your own transport (TLS, unix sockets, in-memory streams)
//! - [`Pool`]: hands out connections and takes them back; [`KeepAlivePool`] is the only
//!   implementation, parameterised by its [`Connector`]
//! - [`default_pool`]: the process-wide pool used when a request doesn't pick one

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use micro_fetch_http::connection::HttpConnection;
use micro_fetch_http::protocol::Protocol;
use once_cell::sync::Lazy;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, trace};
use url::Url;

use crate::ClientError;

/// The (scheme, host, port) triple connections are keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    scheme: String,
    host: String,
    port: u16,
}

impl Origin {
    /// # Errors
    ///
    /// Fails for schemes other than `http` and `https` and for URLs without a host.
    pub fn from_url(url: &Url) -> Result<Self, ClientError> {
        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(ClientError::invalid_request(format!("unsupported scheme: {scheme}")));
        }
        let Some(host) = url.host_str().filter(|host| !host.is_empty()) else {
            return Err(ClientError::invalid_request(format!("missing host: {url}")));
        };
        let Some(port) = url.port_or_known_default() else {
            return Err(ClientError::invalid_request(format!("missing port: {url}")));
        };
        Ok(Self { scheme: scheme.to_string(), host: host.to_string(), port })
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.scheme == "https"
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Opens new connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, origin: &Origin) -> io::Result<HttpConnection>;
}

/// Dials plain TCP with `TCP_NODELAY`.
///
/// `https` origins are refused with [`ErrorKind::Unsupported`]; supply a [`Connector`]
/// that performs the handshake and describes it with
/// [`TlsInfo`](micro_fetch_http::protocol::TlsInfo).
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, origin: &Origin) -> io::Result<HttpConnection> {
        if origin.is_tls() {
            return Err(io::Error::new(ErrorKind::Unsupported, "TcpConnector does not speak tls"));
        }

        let stream = TcpStream::connect((origin.host(), origin.port())).await?;
        stream.set_nodelay(true)?;
        let connection = HttpConnection::new(stream, Protocol::http11());
        debug!(conn_id = connection.connection().id(), %origin, "connected");
        Ok(connection)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Source of connections shared by concurrent requests.
///
/// Sealed: new capabilities can be added without breaking anyone. Customise the
/// transport through the [`Connector`] of a [`KeepAlivePool`] instead.
#[async_trait]
pub trait Pool: sealed::Sealed + Send + Sync + fmt::Debug {
    /// Checks out a connection to `origin`, reusing an idle one when possible.
    async fn acquire(&self, origin: &Origin) -> io::Result<HttpConnection>;

    /// Gives a checked out connection back; it is closed unless `reusable`.
    fn release(&self, origin: &Origin, connection: HttpConnection, reusable: bool);
}

/// Idle connection limits of a [`KeepAlivePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_idle_per_host: 8, idle_timeout: Duration::from_secs(90) }
    }
}

/// Keeps idle connections per [`Origin`] and hands out the most recently used first.
///
/// An idle connection is checked before it is handed out: one the server has closed in
/// the meantime, or that exceeded the idle timeout, is dropped and the next one tried.
/// Expired connections of every origin are also reaped whenever a connection comes back.
pub struct KeepAlivePool<C> {
    connector: C,
    config: PoolConfig,
    idle: Mutex<HashMap<Origin, VecDeque<Idle>>>,
}

struct Idle {
    connection: HttpConnection,
    since: Instant,
}

impl<C: Connector> KeepAlivePool<C> {
    pub fn new(connector: C) -> Self {
        Self::with_config(connector, PoolConfig::default())
    }

    pub fn with_config(connector: C, config: PoolConfig) -> Self {
        Self { connector, config, idle: Mutex::new(HashMap::new()) }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of origins with idle connections.
    pub fn idle_origins(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of idle connections currently kept for `origin`.
    pub fn idle_count(&self, origin: &Origin) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).get(origin).map_or(0, VecDeque::len)
    }

    fn checkout_idle(&self, origin: &Origin) -> Option<HttpConnection> {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = idle.get_mut(origin)?;

        let mut checked_out = None;
        while let Some(Idle { mut connection, since }) = queue.pop_back() {
            if since.elapsed() > self.config.idle_timeout || !connection.check_idle() {
                trace!(conn_id = connection.connection().id(), %origin, "discard stale idle connection");
                connection.connection().close();
                continue;
            }
            checked_out = Some(connection);
            break;
        }

        if queue.is_empty() {
            idle.remove(origin);
        }
        checked_out
    }

    /// Closes idle connections past the idle timeout and forgets origins left without any.
    fn reap_expired(&self, idle: &mut HashMap<Origin, VecDeque<Idle>>) {
        let idle_timeout = self.config.idle_timeout;
        idle.retain(|origin, queue| {
            queue.retain(|entry| {
                let fresh = entry.since.elapsed() <= idle_timeout;
                if !fresh {
                    trace!(conn_id = entry.connection.connection().id(), %origin, "reap expired idle connection");
                    entry.connection.connection().close();
                }
                fresh
            });
            !queue.is_empty()
        });
    }
}

impl<C> sealed::Sealed for KeepAlivePool<C> {}

#[async_trait]
impl<C: Connector> Pool for KeepAlivePool<C> {
    async fn acquire(&self, origin: &Origin) -> io::Result<HttpConnection> {
        if let Some(connection) = self.checkout_idle(origin) {
            trace!(conn_id = connection.connection().id(), %origin, "reuse idle connection");
            return Ok(connection);
        }
        self.connector.connect(origin).await
    }

    fn release(&self, origin: &Origin, connection: HttpConnection, reusable: bool) {
        if !reusable || !connection.is_reusable() || self.config.max_idle_per_host == 0 {
            connection.connection().close();
            return;
        }

        trace!(conn_id = connection.connection().id(), %origin, "connection back to idle");
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = idle.entry(origin.clone()).or_default();
        queue.push_back(Idle { connection, since: Instant::now() });

        while queue.len() > self.config.max_idle_per_host {
            if let Some(evicted) = queue.pop_front() {
                evicted.connection.connection().close();
            }
        }

        self.reap_expired(&mut idle);
    }
}

impl<C> fmt::Debug for KeepAlivePool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepAlivePool").field("config", &self.config).finish_non_exhaustive()
    }
}

static DEFAULT_POOL: Lazy<Arc<dyn Pool>> = Lazy::new(|| Arc::new(KeepAlivePool::new(TcpConnector)));

/// The process-wide pool used by requests that don't choose one, created on first use.
pub fn default_pool() -> Arc<dyn Pool> {
    Arc::clone(&DEFAULT_POOL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedConnector;
    use std::collections::HashSet;

    fn origin() -> Origin {
        Origin::from_url(&Url::parse("http://example.com/index.html").unwrap()).unwrap()
    }

    fn other_origin() -> Origin {
        Origin::from_url(&Url::parse("http://other.example/").unwrap()).unwrap()
    }

    #[test]
    fn origin_from_url() {
        let origin = origin();
        assert_eq!(origin.to_string(), "http://example.com:80");
        assert!(!origin.is_tls());

        let tls = Origin::from_url(&Url::parse("https://example.com:8443/").unwrap()).unwrap();
        assert_eq!(tls.port(), 8443);
        assert!(tls.is_tls());

        assert!(matches!(Origin::from_url(&Url::parse("ftp://example.com/").unwrap()), Err(ClientError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn tcp_connector_refuses_tls() {
        let origin = Origin::from_url(&Url::parse("https://example.com/").unwrap()).unwrap();
        let err = TcpConnector.connect(&origin).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn released_connection_is_reused() {
        let connector = ScriptedConnector::new(vec![vec![]]);
        let pool = KeepAlivePool::new(connector.clone());
        let origin = origin();

        let connection = pool.acquire(&origin).await.unwrap();
        let id = connection.connection().id();
        pool.release(&origin, connection, true);
        assert_eq!(pool.idle_count(&origin), 1);

        let connection = pool.acquire(&origin).await.unwrap();
        assert_eq!(connection.connection().id(), id);
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn unusable_connections_are_closed() {
        let connector = ScriptedConnector::new(vec![vec![], vec![]]);
        let pool = KeepAlivePool::new(connector.clone());
        let origin = origin();

        let connection = pool.acquire(&origin).await.unwrap();
        let handle = connection.connection().clone();
        pool.release(&origin, connection, false);
        assert!(handle.is_closed());
        assert_eq!(pool.idle_count(&origin), 0);

        let connection = pool.acquire(&origin).await.unwrap();
        connection.connection().close();
        pool.release(&origin, connection, true);
        assert_eq!(pool.idle_count(&origin), 0);
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn overflow_evicts_the_oldest() {
        let connector = ScriptedConnector::new(vec![vec![], vec![], vec![]]);
        let pool = KeepAlivePool::with_config(connector, PoolConfig { max_idle_per_host: 2, ..PoolConfig::default() });
        let origin = origin();

        let first = pool.acquire(&origin).await.unwrap();
        let second = pool.acquire(&origin).await.unwrap();
        let third = pool.acquire(&origin).await.unwrap();
        let oldest = first.connection().clone();

        pool.release(&origin, first, true);
        pool.release(&origin, second, true);
        pool.release(&origin, third, true);

        assert_eq!(pool.idle_count(&origin), 2);
        assert!(oldest.is_closed());
    }

    #[tokio::test]
    async fn expired_idle_connections_are_discarded() {
        let connector = ScriptedConnector::new(vec![vec![], vec![]]);
        let config = PoolConfig { idle_timeout: Duration::from_millis(10), ..PoolConfig::default() };
        let pool = KeepAlivePool::with_config(connector.clone(), config);
        let origin = origin();

        let connection = pool.acquire(&origin).await.unwrap();
        let stale = connection.connection().clone();
        pool.release(&origin, connection, true);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let connection = pool.acquire(&origin).await.unwrap();
        assert_ne!(connection.connection().id(), stale.id());
        assert!(stale.is_closed());
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn idle_connection_closed_by_the_server_is_not_reused() {
        let connector = ScriptedConnector::hanging_up(vec![vec![], vec![]]);
        let pool = KeepAlivePool::new(connector.clone());
        let origin = origin();

        let connection = pool.acquire(&origin).await.unwrap();
        let dead = connection.connection().clone();
        pool.release(&origin, connection, true);
        assert_eq!(pool.idle_count(&origin), 1);

        // the server side of the idle connection goes away
        tokio::time::sleep(Duration::from_millis(10)).await;

        let connection = pool.acquire(&origin).await.unwrap();
        assert_ne!(connection.connection().id(), dead.id());
        assert!(dead.is_closed());
        assert_eq!(connector.connects(), 2);
        assert_eq!(pool.idle_origins(), 0);
    }

    #[tokio::test]
    async fn release_reaps_expired_connections_of_other_origins() {
        let connector = ScriptedConnector::new(vec![vec![], vec![]]);
        let config = PoolConfig { idle_timeout: Duration::from_millis(10), ..PoolConfig::default() };
        let pool = KeepAlivePool::with_config(connector, config);
        let (origin, other) = (origin(), other_origin());

        let forgotten = pool.acquire(&other).await.unwrap();
        let handle = forgotten.connection().clone();
        pool.release(&other, forgotten, true);
        assert_eq!(pool.idle_origins(), 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let connection = pool.acquire(&origin).await.unwrap();
        pool.release(&origin, connection, true);

        assert!(handle.is_closed());
        assert_eq!(pool.idle_count(&other), 0);
        assert_eq!(pool.idle_count(&origin), 1);
        assert_eq!(pool.idle_origins(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquire_and_release() {
        const TASKS: usize = 16;
        const ROUNDS: usize = 20;
        const MAX_IDLE: usize = 4;

        let connector = ScriptedConnector::new(vec![vec![]; TASKS * ROUNDS]);
        let config = PoolConfig { max_idle_per_host: MAX_IDLE, ..PoolConfig::default() };
        let pool = Arc::new(KeepAlivePool::with_config(connector.clone(), config));
        let in_use = Arc::new(Mutex::new(HashSet::new()));

        let tasks: Vec<_> = (0..TASKS)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let in_use = Arc::clone(&in_use);
                tokio::spawn(async move {
                    let origin = origin();
                    for _ in 0..ROUNDS {
                        let connection = pool.acquire(&origin).await.unwrap();
                        let id = connection.connection().id();
                        assert!(in_use.lock().unwrap().insert(id), "connection {id} handed out twice");

                        tokio::task::yield_now().await;

                        in_use.lock().unwrap().remove(&id);
                        pool.release(&origin, connection, true);
                        assert!(pool.idle_count(&origin) <= MAX_IDLE);
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        let origin = origin();
        assert!(pool.idle_count(&origin) <= MAX_IDLE);
        assert!(pool.idle_count(&origin) >= 1);
        assert!(connector.connects() <= TASKS * ROUNDS);
        assert!(in_use.lock().unwrap().is_empty());
    }
}
