//! The Search Gateway (§4.2): a uniform query/result contract over multiple
//! web-search providers. Search is best-effort — callers treat any error as
//! "proceed without search context."

pub mod providers;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

use std::{str::FromStr, time::Duration};

use crate::{context::RequestContext, domain::SearchResultSet, prelude::*};

/// The search providers we recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchProviderKind {
    /// Tavily.
    Tavily,
    /// Google.
    Google,
    /// DuckDuckGo.
    DuckDuckGo,
}

impl FromStr for SearchProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tavily" => Ok(SearchProviderKind::Tavily),
            "google" => Ok(SearchProviderKind::Google),
            "duckduckgo" => Ok(SearchProviderKind::DuckDuckGo),
            other => Err(anyhow!("unrecognized search provider: {other}")),
        }
    }
}

/// Build the provider implementation named by `kind`, reading whatever
/// environment variables it needs directly (mirroring `Config::from_env`'s
/// own style, rather than threading a second config struct through here).
pub fn create_provider(
    kind: SearchProviderKind,
    client: reqwest::Client,
) -> Result<Box<dyn SearchProvider>> {
    match kind {
        SearchProviderKind::Tavily => {
            let api_key = std::env::var("TAVILY_API_KEY")
                .context("missing required environment variable TAVILY_API_KEY")?;
            Ok(Box::new(providers::TavilyProvider::new(client, api_key)))
        }
        SearchProviderKind::Google => {
            let api_key = std::env::var("GOOGLE_API_KEY")
                .context("missing required environment variable GOOGLE_API_KEY")?;
            let search_engine_id = std::env::var("GOOGLE_SEARCH_ENGINE_ID")
                .context("missing required environment variable GOOGLE_SEARCH_ENGINE_ID")?;
            Ok(Box::new(providers::GoogleProvider::new(
                client,
                api_key,
                search_engine_id,
            )))
        }
        SearchProviderKind::DuckDuckGo => Ok(Box::new(providers::DuckDuckGoProvider::new(client))),
    }
}

/// Failure modes surfaced by the Search Gateway.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// A transport-level error talking to the provider.
    #[error("transport error calling search provider: {0}")]
    Transport(String),
    /// The pipeline deadline elapsed waiting for the provider.
    #[error("search request exceeded its deadline")]
    DeadlineExceeded,
    /// The provider responded with an error.
    #[error("search provider returned an error: {0}")]
    Provider(String),
}

/// Interface trait for search providers.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run a single search, returning up to `max_results` results.
    async fn search(
        &self,
        ctx: &RequestContext,
        query: &str,
        max_results: u32,
    ) -> Result<SearchResultSet, SearchError>;
}

/// A provider that always returns an empty result set: the "none" sentinel
/// used when search is disabled, so the orchestrator never needs a special
/// case for "search disabled" (§4.2).
pub struct NoSearchProvider;

#[async_trait]
impl SearchProvider for NoSearchProvider {
    async fn search(
        &self,
        _ctx: &RequestContext,
        query: &str,
        _max_results: u32,
    ) -> Result<SearchResultSet, SearchError> {
        Ok(SearchResultSet {
            query: query.to_owned(),
            results: Vec::new(),
        })
    }
}

/// Configuration for a [`SearchGateway`] instance.
#[derive(Debug, Clone)]
pub struct SearchGatewayConfig {
    /// Default number of results to request.
    pub max_results: u32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for SearchGatewayConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            timeout: Duration::from_secs(30),
        }
    }
}

/// The Search Gateway: a uniform query/result contract over multiple web
/// search providers.
pub struct SearchGateway {
    config: SearchGatewayConfig,
    provider: Box<dyn SearchProvider>,
}

impl SearchGateway {
    /// Build a gateway around a provider.
    pub fn new(provider: Box<dyn SearchProvider>, config: SearchGatewayConfig) -> Self {
        Self { config, provider }
    }

    /// Build a gateway that never finds anything (search disabled).
    pub fn disabled() -> Self {
        Self::new(Box::new(NoSearchProvider), SearchGatewayConfig::default())
    }

    /// `search(ctx, query, max_results) → result_set | err` (§4.2).
    #[instrument(level = "debug", skip(self, ctx))]
    pub async fn search(
        &self,
        ctx: &RequestContext,
        query: &str,
    ) -> Result<SearchResultSet, SearchError> {
        let timeout = self.config.timeout.min(ctx.time_remaining());
        match tokio::time::timeout(
            timeout,
            self.provider.search(ctx, query, self.config.max_results),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SearchError::DeadlineExceeded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_gateway_returns_empty_results() {
        let gateway = SearchGateway::disabled();
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));
        let result = gateway.search(&ctx, "anything").await.unwrap();
        assert_eq!(result.query, "anything");
        assert!(result.results.is_empty());
    }
}
