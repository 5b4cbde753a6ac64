//! Concrete search providers, each wrapping a shared [`reqwest::Client`]
//! (the same thin-wrapper-over-`reqwest` style as the LLM Gateway's
//! predecessor HTTP calls).

use serde::Deserialize;

use super::{SearchError, SearchProvider};
use crate::{context::RequestContext, domain::SearchResultSet, prelude::*};

/// Tavily's `/search` endpoint.
pub struct TavilyProvider {
    client: reqwest::Client,
    api_key: String,
}

impl TavilyProvider {
    /// Build a provider for the given API key, reusing `client`.
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    #[instrument(level = "debug", skip(self, ctx))]
    async fn search(
        &self,
        ctx: &RequestContext,
        query: &str,
        max_results: u32,
    ) -> Result<SearchResultSet, SearchError> {
        let _ = ctx;
        let response = self
            .client
            .post("https://api.tavily.com/search")
            .json(&TavilyRequest {
                api_key: &self.api_key,
                query,
                max_results,
            })
            .send()
            .await
            .map_err(|error| SearchError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Provider(format!(
                "Tavily returned status {status}"
            )));
        }

        let body = response
            .json::<TavilyResponse>()
            .await
            .map_err(|error| SearchError::Provider(error.to_string()))?;

        Ok(SearchResultSet {
            query: query.to_owned(),
            results: body
                .results
                .into_iter()
                .map(|result| crate::domain::SearchResult {
                    title: result.title,
                    url: result.url,
                    excerpt: result.content,
                })
                .collect(),
        })
    }
}

/// Google's Programmable Search Engine JSON API.
pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: String,
    search_engine_id: String,
}

impl GoogleProvider {
    /// Build a provider for the given API key and search engine id.
    pub fn new(client: reqwest::Client, api_key: String, search_engine_id: String) -> Self {
        Self {
            client,
            api_key,
            search_engine_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

#[async_trait]
impl SearchProvider for GoogleProvider {
    #[instrument(level = "debug", skip(self, ctx))]
    async fn search(
        &self,
        ctx: &RequestContext,
        query: &str,
        max_results: u32,
    ) -> Result<SearchResultSet, SearchError> {
        let _ = ctx;
        let response = self
            .client
            .get("https://www.googleapis.com/customsearch/v1")
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.search_engine_id.as_str()),
                ("q", query),
                ("num", &max_results.min(10).to_string()),
            ])
            .send()
            .await
            .map_err(|error| SearchError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Provider(format!(
                "Google returned status {status}"
            )));
        }

        let body = response
            .json::<GoogleResponse>()
            .await
            .map_err(|error| SearchError::Provider(error.to_string()))?;

        Ok(SearchResultSet {
            query: query.to_owned(),
            results: body
                .items
                .into_iter()
                .map(|item| crate::domain::SearchResult {
                    title: item.title,
                    url: item.link,
                    excerpt: item.snippet,
                })
                .collect(),
        })
    }
}

/// DuckDuckGo's "Instant Answer" API. No key required, and far less rich
/// than Tavily/Google, but useful as a no-signup default.
pub struct DuckDuckGoProvider {
    client: reqwest::Client,
}

impl DuckDuckGoProvider {
    /// Build a provider, reusing `client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct DuckDuckGoResponse {
    #[serde(default, rename = "RelatedTopics")]
    related_topics: Vec<DuckDuckGoTopic>,
}

#[derive(Debug, Deserialize)]
struct DuckDuckGoTopic {
    #[serde(default, rename = "Text")]
    text: String,
    #[serde(default, rename = "FirstURL")]
    first_url: String,
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    #[instrument(level = "debug", skip(self, ctx))]
    async fn search(
        &self,
        ctx: &RequestContext,
        query: &str,
        max_results: u32,
    ) -> Result<SearchResultSet, SearchError> {
        let _ = ctx;
        let response = self
            .client
            .get("https://api.duckduckgo.com/")
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|error| SearchError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Provider(format!(
                "DuckDuckGo returned status {status}"
            )));
        }

        let body = response
            .json::<DuckDuckGoResponse>()
            .await
            .map_err(|error| SearchError::Provider(error.to_string()))?;

        let results = body
            .related_topics
            .into_iter()
            .filter(|topic| !topic.text.is_empty() && !topic.first_url.is_empty())
            .take(max_results as usize)
            .map(|topic| crate::domain::SearchResult {
                title: topic.text.clone(),
                url: topic.first_url,
                excerpt: topic.text,
            })
            .collect();

        Ok(SearchResultSet {
            query: query.to_owned(),
            results,
        })
    }
}
