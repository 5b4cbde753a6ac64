//! The request-scoped context threaded through every suspending call.
//!
//! A single [`RequestContext`] carries the pipeline deadline and a
//! cancellation signal; there is no ambient/global request state anywhere
//! in this crate (§9 of the design notes).

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Context carried through an in-flight request: a deadline and a
/// cancellation signal.
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Instant,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Create a new context with the given deadline, relative to now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancellation: CancellationToken::new(),
        }
    }

    /// Create a child context sharing this context's cancellation token, so
    /// cancelling the parent cancels every child, but bounded by whichever
    /// deadline is sooner.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        Self {
            deadline: candidate.min(self.deadline),
            cancellation: self.cancellation.clone(),
        }
    }

    /// A handle that can be used to cancel this context (and anything
    /// derived from it) from the outside.
    pub fn cancellation_handle(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Has the deadline already elapsed?
    pub fn is_deadline_exceeded(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Has cancellation been requested?
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// How much time remains before the deadline, or `Duration::ZERO` if
    /// it has already passed.
    pub fn time_remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Race a future against this context's deadline and cancellation.
    /// Returns `Ok(None)` if the future resolved first with no value needed
    /// by the caller... in practice callers use `select_outcome`, which is
    /// the richer variant below.
    pub async fn race<F, T>(&self, future: F) -> RaceOutcome<T>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => RaceOutcome::Cancelled,
            () = tokio::time::sleep_until(self.deadline) => RaceOutcome::DeadlineExceeded,
            value = future => RaceOutcome::Completed(value),
        }
    }
}

/// The outcome of racing a future against a [`RequestContext`].
#[derive(Debug)]
pub enum RaceOutcome<T> {
    /// The future completed before the deadline or cancellation.
    Completed(T),
    /// The deadline elapsed first.
    DeadlineExceeded,
    /// Cancellation was requested first.
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn race_returns_completed_when_future_is_fast() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));
        let outcome = ctx.race(async { 42 }).await;
        assert!(matches!(outcome, RaceOutcome::Completed(42)));
    }

    #[tokio::test]
    async fn race_returns_deadline_exceeded_when_future_is_slow() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(10));
        let outcome = ctx
            .race(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
            })
            .await;
        assert!(matches!(outcome, RaceOutcome::DeadlineExceeded));
    }

    #[tokio::test]
    async fn race_observes_cancellation() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));
        let handle = ctx.cancellation_handle();
        handle.cancel();
        let outcome = ctx
            .race(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
            })
            .await;
        assert!(matches!(outcome, RaceOutcome::Cancelled));
    }

    #[test]
    fn child_context_never_outlives_parent_deadline() {
        let parent = RequestContext::with_timeout(Duration::from_millis(50));
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert!(child.time_remaining() <= Duration::from_millis(50));
    }
}
