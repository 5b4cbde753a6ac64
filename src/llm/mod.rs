//! The LLM Gateway (§4.1): a uniform request/response contract over
//! multiple chat providers, with retry/backoff and structured-JSON
//! extraction.

pub mod extract;
pub mod provider;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

use std::{str::FromStr, time::Duration};

use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::{
    context::RequestContext,
    prelude::*,
    retry::{IsKnownTransient, RetryOutcome, retry_fatal, retry_ok, retry_transient, with_retry},
};

pub use provider::LlmProvider;

/// The LLM providers we recognize. Sealed: there is no "custom" variant, per
/// the design notes' preference for sum types over open-ended
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    /// OpenAI.
    OpenAi,
    /// Anthropic.
    Anthropic,
    /// Google Gemini.
    Gemini,
}

impl LlmProviderKind {
    /// The environment variable that carries this provider's API key.
    pub fn api_key_env_var(&self) -> String {
        match self {
            LlmProviderKind::OpenAi => "OPENAI_API_KEY".to_owned(),
            LlmProviderKind::Anthropic => "ANTHROPIC_API_KEY".to_owned(),
            LlmProviderKind::Gemini => "GEMINI_API_KEY".to_owned(),
        }
    }

    /// The model used when the caller doesn't specify one.
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProviderKind::OpenAi => "gpt-4o-mini",
            LlmProviderKind::Anthropic => "claude-3-5-haiku-latest",
            LlmProviderKind::Gemini => "gemini-1.5-flash",
        }
    }
}

impl FromStr for LlmProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(LlmProviderKind::OpenAi),
            "anthropic" => Ok(LlmProviderKind::Anthropic),
            "gemini" => Ok(LlmProviderKind::Gemini),
            other => Err(anyhow!("unrecognized LLM provider: {other}")),
        }
    }
}

/// Failure modes surfaced by the LLM Gateway (§4.1).
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// A transport-level error talking to the provider.
    #[error("transport error calling LLM provider: {0}")]
    Transport(String),

    /// The provider rate-limited us (HTTP 429).
    #[error("LLM provider rate-limited the request")]
    RateLimited,

    /// The pipeline deadline elapsed waiting for the provider.
    #[error("LLM request exceeded its deadline")]
    DeadlineExceeded,

    /// The request was cancelled.
    #[error("LLM request was cancelled")]
    Cancelled,

    /// The provider responded with a non-200, non-429 error.
    #[error("LLM provider returned an error: {0}")]
    Provider(String),

    /// The provider's response had no choices/candidates in it.
    #[error("LLM provider response had no content")]
    EmptyChoices,

    /// We couldn't extract valid JSON from the response text.
    #[error("could not extract valid JSON from LLM response")]
    InvalidJson,
}

impl IsKnownTransient for LlmError {
    fn is_known_transient(&self) -> bool {
        matches!(self, LlmError::Transport(_) | LlmError::RateLimited)
    }
}

/// Configuration for a single [`LlmGateway`] instance (§4.1).
#[derive(Debug, Clone)]
pub struct LlmGatewayConfig {
    /// Which provider to call.
    pub provider: LlmProviderKind,
    /// The API key to authenticate with.
    pub api_key: String,
    /// Model override; defaults to `provider.default_model()`.
    pub model: Option<String>,
    /// Number of additional attempts after the first, on transient errors.
    pub max_retries: u32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl LlmGatewayConfig {
    /// Construct a config with the spec's defaults: 3 retries, 5 minute
    /// timeout.
    pub fn new(provider: LlmProviderKind, api_key: String) -> Self {
        Self {
            provider,
            api_key,
            model: None,
            max_retries: 3,
            timeout: Duration::from_secs(5 * 60),
        }
    }

    /// The model to use: the override, or the provider's default.
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(self.provider.default_model())
    }
}

/// The LLM Gateway: a uniform request/response contract over multiple chat
/// providers.
pub struct LlmGateway {
    config: LlmGatewayConfig,
    provider: Box<dyn LlmProvider>,
}

impl LlmGateway {
    /// Build a gateway from its configuration.
    pub fn new(config: LlmGatewayConfig) -> Result<Self> {
        let provider = provider::create_provider(&config)?;
        Ok(Self { config, provider })
    }

    /// Build a gateway around an explicit provider implementation (used by
    /// tests to inject a mock).
    pub fn with_provider(config: LlmGatewayConfig, provider: Box<dyn LlmProvider>) -> Self {
        Self { config, provider }
    }

    /// `complete(ctx, prompt) → text | err` (§4.1): a single request/response
    /// text completion with no structural expectations.
    #[instrument(level = "debug", skip_all)]
    pub async fn complete(&self, ctx: &RequestContext, prompt: &str) -> Result<String, LlmError> {
        let model = self.config.model().to_owned();
        let outcome = with_retry(ctx, self.config.max_retries, |attempt_number| {
            let model = model.clone();
            async move {
                debug!(attempt = attempt_number, %model, "calling LLM provider");
                match self.provider.chat(ctx, &model, prompt).await {
                    Ok(text) => retry_ok(text),
                    Err(error) if error.is_known_transient() => retry_transient(error),
                    Err(error) => retry_fatal(error),
                }
            }
        })
        .await;

        match outcome {
            RetryOutcome::Ok(text) => Ok(text),
            RetryOutcome::Failed(error) => Err(error),
            RetryOutcome::DeadlineExceeded => Err(LlmError::DeadlineExceeded),
            RetryOutcome::Cancelled => Err(LlmError::Cancelled),
        }
    }

    /// `complete_json(ctx, prompt, target_schema) → target | err` (§4.1):
    /// performs `complete`, then extracts and parses a JSON value into the
    /// caller's target shape.
    ///
    /// The target schema is passed to the provider as a hint; it is not
    /// used to validate the response here. Missing required fields are a
    /// stage-layer concern (§4.1, §4.4–4.5): callers should deserialize into
    /// a permissive "raw" shape and validate semantics themselves.
    pub async fn complete_json<T>(&self, ctx: &RequestContext, prompt: &str) -> Result<T, LlmError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let text = self.complete(ctx, prompt).await?;
        extract::extract_json(&text).ok_or(LlmError::InvalidJson).and_then(|value| {
            serde_json::from_value(value).map_err(|_| LlmError::InvalidJson)
        })
    }
}
