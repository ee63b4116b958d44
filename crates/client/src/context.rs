//! Deadline and cancellation scope of an operation.

use std::future::pending;
use std::time::Duration;

use tokio::select;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::ClientError;

/// Carries an optional deadline and a cancellation signal into
/// [`Request::execute`](crate::Request::execute).
///
/// Derived contexts only ever tighten their parent: deadlines shrink, and canceling a
/// parent cancels every context derived from it.
///
/// ```
/// use std::time::Duration;
/// use micro_fetch::Context;
///
/// let ctx = Context::background().with_timeout(Duration::from_secs(5));
/// let child = ctx.with_cancellation();
/// ctx.cancel();
/// assert!(child.is_canceled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl Context {
    /// A context that is never canceled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a context that expires at `deadline`, or earlier if this one does.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        };
        Self { deadline: Some(deadline), cancellation: self.cancellation.clone() }
    }

    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a context with its own cancellation signal, see [`Context::cancel`].
    #[must_use]
    pub fn with_cancellation(&self) -> Self {
        Self { deadline: self.deadline, cancellation: self.cancellation.child_token() }
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Derives the context of one operation: the caller's deadline or `now + timeout`,
    /// whichever comes first.
    pub(crate) fn for_operation(&self, timeout: Option<Duration>) -> Self {
        match timeout {
            Some(timeout) => self.with_timeout(timeout),
            None => self.clone(),
        }
    }

    /// Runs `future` unless this context is canceled or expires first.
    pub(crate) async fn bounded<T, F>(&self, future: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        let deadline = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        select! {
            biased;
            () = self.cancellation.cancelled() => Err(ClientError::Canceled),
            () = deadline => Err(ClientError::DeadlineExceeded),
            result = future => result,
        }
    }
}
