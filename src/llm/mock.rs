//! An in-memory mock LLM provider, for orchestrator tests (§9 design
//! notes). Compiled in for this crate's own unit tests, and behind the
//! `test-util` feature for integration tests in `tests/` that need it
//! without network access.

use std::{collections::VecDeque, sync::Mutex};

use crate::{context::RequestContext, prelude::*};

use super::{LlmError, LlmProvider};

/// A single canned response or error.
pub enum MockResponse {
    /// Return this text.
    Text(String),
    /// Fail with this error.
    Error(LlmError),
}

/// A provider that returns a fixed queue of canned responses, one per call.
/// Once the queue is drained, it keeps returning the last entry forever, so
/// straight-line tests can queue exactly the responses they care about
/// without worrying about exhausting the queue on an unrelated later call.
pub struct MockLlmProvider {
    responses: Mutex<VecDeque<MockResponse>>,
}

impl MockLlmProvider {
    /// Build a mock that returns `responses` in order, one per call.
    pub fn new(responses: Vec<MockResponse>) -> Self {
        assert!(!responses.is_empty(), "MockLlmProvider needs at least one response");
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    /// Build a mock that always returns `text`.
    pub fn always(text: impl Into<String>) -> Self {
        Self::new(vec![MockResponse::Text(text.into())])
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn chat(
        &self,
        _ctx: &RequestContext,
        _model: &str,
        _prompt: &str,
    ) -> Result<String, LlmError> {
        let mut responses = self.responses.lock().unwrap();
        let next = if responses.len() > 1 {
            responses.pop_front().expect("checked non-empty above")
        } else {
            // Keep the final response around so later, unrelated calls in
            // the same test don't panic.
            match responses.front().expect("always non-empty") {
                MockResponse::Text(text) => MockResponse::Text(text.clone()),
                MockResponse::Error(error) => MockResponse::Error(clone_error(error)),
            }
        };
        match next {
            MockResponse::Text(text) => Ok(text),
            MockResponse::Error(error) => Err(error),
        }
    }
}

fn clone_error(error: &LlmError) -> LlmError {
    match error {
        LlmError::Transport(msg) => LlmError::Transport(msg.clone()),
        LlmError::RateLimited => LlmError::RateLimited,
        LlmError::DeadlineExceeded => LlmError::DeadlineExceeded,
        LlmError::Cancelled => LlmError::Cancelled,
        LlmError::Provider(msg) => LlmError::Provider(msg.clone()),
        LlmError::EmptyChoices => LlmError::EmptyChoices,
        LlmError::InvalidJson => LlmError::InvalidJson,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_queued_responses_in_order() {
        let provider = MockLlmProvider::new(vec![
            MockResponse::Error(LlmError::RateLimited),
            MockResponse::Text("ok".to_owned()),
        ]);
        let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(5));
        let first = provider.chat(&ctx, "m", "p").await;
        assert!(matches!(first, Err(LlmError::RateLimited)));
        let second = provider.chat(&ctx, "m", "p").await.unwrap();
        assert_eq!(second, "ok");
        // Queue is drained to one entry; further calls keep returning it.
        let third = provider.chat(&ctx, "m", "p").await.unwrap();
        assert_eq!(third, "ok");
    }
}
