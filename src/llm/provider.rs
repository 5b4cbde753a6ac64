//! Provider implementations for the LLM Gateway.
//!
//! We route every recognized provider (`openai`, `anthropic`, `gemini`)
//! through a single [`genai::Client`], the way the teacher's `NativeDriver`
//! does: `genai` resolves the right adapter from the model name itself, so
//! there is one code path rather than three hand-rolled HTTP clients.

use genai::{
    Client,
    chat::{ChatMessage, ChatOptions, ChatRequest, ChatResponseFormat, JsonSpec},
};

use super::{LlmError, LlmGatewayConfig};
use crate::{context::RequestContext, prelude::*, retry::IsKnownTransient};

/// Interface trait for LLM providers (§9 design notes: sealed variants,
/// implementations differ only in request encoding/auth/response shape).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run a single chat completion, returning the raw response text.
    async fn chat(
        &self,
        ctx: &RequestContext,
        model: &str,
        prompt: &str,
    ) -> Result<String, LlmError>;
}

/// Build the provider implementation for a gateway's configuration.
pub fn create_provider(_config: &LlmGatewayConfig) -> Result<Box<dyn LlmProvider>> {
    Ok(Box::new(GenAiProvider::new()))
}

/// A provider backed by the `genai` crate, covering OpenAI, Anthropic and
/// Gemini through one client.
pub struct GenAiProvider {
    client: Client,
}

impl GenAiProvider {
    /// Create a new provider. `genai` resolves API keys from the
    /// provider-specific environment variables itself (`OPENAI_API_KEY`,
    /// `ANTHROPIC_API_KEY`, `GEMINI_API_KEY`), which is exactly the set
    /// `Config::from_env` already requires the operator to set.
    pub fn new() -> Self {
        Self {
            client: Client::default(),
        }
    }
}

impl Default for GenAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for GenAiProvider {
    #[instrument(level = "debug", skip(self, ctx, prompt))]
    async fn chat(
        &self,
        ctx: &RequestContext,
        model: &str,
        prompt: &str,
    ) -> Result<String, LlmError> {
        let request = ChatRequest {
            system: None,
            messages: vec![ChatMessage::user(prompt.to_owned())],
            ..ChatRequest::default()
        };
        let options = ChatOptions {
            response_format: Some(ChatResponseFormat::JsonSpec(JsonSpec {
                name: "response".to_owned(),
                description: None,
                schema: json!({ "type": "object" }),
            })),
            ..ChatOptions::default()
        };

        let timeout = ctx.time_remaining();
        let call = self.client.exec_chat(model, request, Some(&options));
        let response = tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| LlmError::DeadlineExceeded)?
            .map_err(|error| classify(&error))?;

        let content = response
            .content
            .as_ref()
            .and_then(|content| content.text_as_str())
            .ok_or(LlmError::EmptyChoices)?;
        Ok(content.to_owned())
    }
}

/// Turn a `genai` error into one of our gateway error kinds.
fn classify(error: &genai::Error) -> LlmError {
    if error.is_known_transient() {
        LlmError::Transport(error.to_string())
    } else {
        LlmError::Provider(error.to_string())
    }
}

impl IsKnownTransient for genai::Error {
    fn is_known_transient(&self) -> bool {
        use genai::Error;
        match self {
            Error::NoChatResponse { .. } | Error::InvalidJsonResponseElement { .. } => true,
            Error::WebAdapterCall { webc_error, .. } | Error::WebModelCall { webc_error, .. } => {
                webc_error.is_known_transient()
            }
            _ => false,
        }
    }
}

impl IsKnownTransient for genai::webc::Error {
    fn is_known_transient(&self) -> bool {
        use genai::webc::Error;
        match self {
            Error::ResponseFailedNotJson { .. } => true,
            Error::ResponseFailedStatus { status, .. } => status.is_known_transient(),
            Error::Reqwest(error) => error.is_known_transient(),
            _ => false,
        }
    }
}

impl IsKnownTransient for reqwest::Error {
    fn is_known_transient(&self) -> bool {
        match self.status() {
            Some(status) => status.is_known_transient(),
            // Unfortunately `reqwest` doesn't expose enough detail to be
            // certain which other kinds of errors are transient.
            None => true,
        }
    }
}

impl IsKnownTransient for reqwest::StatusCode {
    fn is_known_transient(&self) -> bool {
        let transient_failures = [
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            reqwest::StatusCode::BAD_GATEWAY,
            reqwest::StatusCode::SERVICE_UNAVAILABLE,
            reqwest::StatusCode::GATEWAY_TIMEOUT,
        ];
        transient_failures.contains(self)
    }
}
