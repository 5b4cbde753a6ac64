//! An in-memory mock search provider, for orchestrator tests. Available
//! behind the `test-util` feature, mirroring `llm::mock`.

use std::{collections::VecDeque, sync::Mutex};

use crate::{context::RequestContext, domain::SearchResultSet, prelude::*};

use super::{SearchError, SearchProvider};

/// A single canned response or error.
pub enum MockSearchResponse {
    /// Return this result set.
    Results(SearchResultSet),
    /// Fail with this error.
    Error(SearchError),
}

/// A provider that returns a fixed queue of canned responses, one per call,
/// then keeps returning the last entry forever (see `llm::mock` for why).
pub struct MockSearchProvider {
    responses: Mutex<VecDeque<MockSearchResponse>>,
}

impl MockSearchProvider {
    /// Build a mock that returns `responses` in order, one per call.
    pub fn new(responses: Vec<MockSearchResponse>) -> Self {
        assert!(!responses.is_empty(), "MockSearchProvider needs at least one response");
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    /// Build a mock that always returns `results`.
    pub fn always(results: SearchResultSet) -> Self {
        Self::new(vec![MockSearchResponse::Results(results)])
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn search(
        &self,
        _ctx: &RequestContext,
        _query: &str,
        _max_results: u32,
    ) -> Result<SearchResultSet, SearchError> {
        let mut responses = self.responses.lock().unwrap();
        let next = if responses.len() > 1 {
            responses.pop_front().expect("checked non-empty above")
        } else {
            match responses.front().expect("always non-empty") {
                MockSearchResponse::Results(results) => MockSearchResponse::Results(results.clone()),
                MockSearchResponse::Error(error) => MockSearchResponse::Error(clone_error(error)),
            }
        };
        match next {
            MockSearchResponse::Results(results) => Ok(results),
            MockSearchResponse::Error(error) => Err(error),
        }
    }
}

fn clone_error(error: &SearchError) -> SearchError {
    match error {
        SearchError::Transport(msg) => SearchError::Transport(msg.clone()),
        SearchError::DeadlineExceeded => SearchError::DeadlineExceeded,
        SearchError::Provider(msg) => SearchError::Provider(msg.clone()),
    }
}
