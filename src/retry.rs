//! Retry support shared by the LLM and search gateways.
//!
//! We keep the teacher's [`keen_retry`] vocabulary — a `RetryResult`
//! distinguishes a *transient* failure (worth retrying) from a *fatal* one
//! (not) — but drive the loop ourselves instead of using
//! `keen_retry`'s jittered executor, because §4.1 specifies a precise
//! backoff formula (`2^attempt` seconds) rather than a jittered range.

use std::time::Duration;

use keen_retry::RetryResult;

use crate::{
    context::{RaceOutcome, RequestContext},
    prelude::*,
};

/// Is this error transient (worth retrying) or fatal?
///
/// By default assume errors are fatal until they've been observed in the
/// wild and confirmed transient: this prevents burning through retry budget
/// on errors that will never resolve.
pub trait IsKnownTransient {
    /// Is this error likely to be transient?
    fn is_known_transient(&self) -> bool;
}

/// What happened while driving a retry loop to completion.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// The operation succeeded, possibly after some retries.
    Ok(T),
    /// The operation failed fatally (not transient), or exhausted its
    /// retry budget.
    Failed(E),
    /// The context's deadline elapsed while waiting for a retry or for the
    /// operation itself.
    DeadlineExceeded,
    /// The context was cancelled while waiting for a retry or for the
    /// operation itself.
    Cancelled,
}

/// Run `attempt` up to `1 + max_retries` times, sleeping `2^attempt` seconds
/// between transient failures, honoring `ctx`'s deadline and cancellation at
/// every suspension point (including before each backoff sleep).
pub async fn with_retry<T, E, F, Fut>(
    ctx: &RequestContext,
    max_retries: u32,
    mut attempt: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = RetryResult<(), (), T, E>>,
{
    for attempt_number in 0..=max_retries {
        if ctx.is_cancelled() {
            return RetryOutcome::Cancelled;
        }
        if ctx.is_deadline_exceeded() {
            return RetryOutcome::DeadlineExceeded;
        }

        match ctx.race(attempt(attempt_number)).await {
            RaceOutcome::Cancelled => return RetryOutcome::Cancelled,
            RaceOutcome::DeadlineExceeded => return RetryOutcome::DeadlineExceeded,
            RaceOutcome::Completed(RetryResult::Ok { output, .. }) => {
                return RetryOutcome::Ok(output);
            }
            RaceOutcome::Completed(RetryResult::Fatal { error, .. }) => {
                return RetryOutcome::Failed(error);
            }
            RaceOutcome::Completed(RetryResult::Transient { error, .. }) => {
                if attempt_number == max_retries {
                    return RetryOutcome::Failed(error);
                }
                debug!(
                    attempt = attempt_number,
                    "transient failure, backing off before retrying"
                );
                let backoff = Duration::from_secs(2u64.saturating_pow(attempt_number));
                match ctx.race(tokio::time::sleep(backoff)).await {
                    RaceOutcome::Cancelled => return RetryOutcome::Cancelled,
                    RaceOutcome::DeadlineExceeded => return RetryOutcome::DeadlineExceeded,
                    RaceOutcome::Completed(()) => {}
                }
            }
        }
    }
    unreachable!("loop always returns before exhausting its range")
}

/// Build a [`RetryResult::Ok`] value with unit bookkeeping fields.
pub fn retry_ok<T, E>(output: T) -> RetryResult<(), (), T, E> {
    RetryResult::Ok {
        reported_input: (),
        output,
    }
}

/// Build a [`RetryResult::Fatal`] value with unit bookkeeping fields.
pub fn retry_fatal<T, E>(error: E) -> RetryResult<(), (), T, E> {
    RetryResult::Fatal { input: (), error }
}

/// Build a [`RetryResult::Transient`] value with unit bookkeeping fields.
pub fn retry_transient<T, E>(error: E) -> RetryResult<(), (), T, E> {
    RetryResult::Transient { input: (), error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_immediately_without_retrying() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));
        let calls = AtomicU32::new(0);
        let result = with_retry(&ctx, 3, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { retry_ok::<_, ()>(7) }
        })
        .await;
        assert!(matches!(result, RetryOutcome::Ok(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(30));
        let calls = AtomicU32::new(0);
        let result = with_retry(&ctx, 3, |_attempt| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    retry_transient("rate limited")
                } else {
                    retry_ok(99)
                }
            }
        })
        .await;
        assert!(matches!(result, RetryOutcome::Ok(99)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fatal_failures_are_not_retried() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));
        let calls = AtomicU32::new(0);
        let result: RetryOutcome<i32, &str> = with_retry(&ctx, 3, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { retry_fatal("nope") }
        })
        .await;
        assert!(matches!(result, RetryOutcome::Failed("nope")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausting_retry_budget_surfaces_last_transient_error() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(30));
        let calls = AtomicU32::new(0);
        let result: RetryOutcome<i32, &str> = with_retry(&ctx, 1, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { retry_transient("still failing") }
        })
        .await;
        assert!(matches!(result, RetryOutcome::Failed("still failing")));
        // max_retries = 1 means 2 total attempts.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancellation_before_first_attempt_is_observed() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));
        ctx.cancellation_handle().cancel();
        let calls = AtomicU32::new(0);
        let result: RetryOutcome<i32, &str> = with_retry(&ctx, 3, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { retry_ok(1) }
        })
        .await;
        assert!(matches!(result, RetryOutcome::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
