use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture, WaitForCancellationFutureOwned};
use tracing::debug;
use triomphe::Arc;

use crate::protocol::Protocol;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A cheap, cloneable handle to one transport connection.
///
/// It exposes what was negotiated and lets any task close the connection. Closing is
/// idempotent; pending reads and writes on the owning
/// [`HttpConnection`](crate::connection::HttpConnection) fail promptly afterwards.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    protocol: Protocol,
    closed: CancellationToken,
}

impl Connection {
    #[must_use]
    pub fn new(protocol: Protocol) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        Self { inner: Arc::new(Inner { id, protocol, closed: CancellationToken::new() }) }
    }

    /// Process-unique id, handy for logs.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn protocol(&self) -> &Protocol {
        &self.inner.protocol
    }

    /// Closes the connection. Safe to call repeatedly and from any task.
    pub fn close(&self) {
        if !self.inner.closed.is_cancelled() {
            debug!(conn_id = self.inner.id, "close connection");
        }
        self.inner.closed.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Resolves once the connection has been closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.inner.closed.cancelled()
    }

    /// Owned variant of [`Connection::closed`], for storing inside other futures.
    #[must_use]
    pub fn closed_owned(&self) -> WaitForCancellationFutureOwned {
        self.inner.closed.clone().cancelled_owned()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("protocol", &self.inner.protocol)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = Connection::new(Protocol::http11());
        let b = Connection::new(Protocol::http11());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.protocol().minor(), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_shared() {
        let connection = Connection::new(Protocol::http11());
        let cloned = connection.clone();
        let waiter = tokio::spawn(async move { cloned.closed_owned().await });

        connection.close();
        connection.close();

        assert!(connection.is_closed());
        waiter.await.unwrap();
    }
}
