//! Environment-based configuration.
//!
//! We read everything directly from `std::env`, the way the teacher's
//! `llm_client.rs` reads `OPENAI_API_BASE`/`OPENAI_API_KEY`, rather than
//! pulling in a dedicated config crate: there are few enough settings here
//! that a config crate would be more ceremony than help.

use std::time::Duration;

use crate::{llm::LlmProviderKind, prelude::*, search::SearchProviderKind};

/// Top-level service configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Which LLM provider to use.
    pub llm_provider: LlmProviderKind,
    /// The API key for `llm_provider`.
    pub llm_api_key: String,
    /// Model override, if any.
    pub llm_model: Option<String>,
    /// Which search provider to use, if search is enabled.
    pub search_provider: Option<SearchProviderKind>,
    /// Whether web search enrichment is enabled at all.
    pub search_enabled: bool,
    /// Database connection string, e.g. `sqlite://data/verdicts.db`.
    pub database_url: String,
    /// The port to listen on.
    pub port: u16,
    /// The end-to-end pipeline deadline.
    pub pipeline_timeout: Duration,
}

impl Config {
    /// Load configuration from the process environment, after loading a
    /// `.env` file if one is present.
    pub fn from_env() -> Result<Self> {
        let llm_provider: LlmProviderKind = env_required("LLM_PROVIDER")?
            .parse()
            .context("invalid LLM_PROVIDER")?;
        let llm_api_key = env_required(&llm_provider.api_key_env_var())?;
        let llm_model = std::env::var("LLM_MODEL").ok();

        let search_enabled = env_bool("SEARCH_ENABLED", false)?;
        let search_provider = if search_enabled {
            Some(
                env_required("SEARCH_PROVIDER")?
                    .parse::<SearchProviderKind>()
                    .context("invalid SEARCH_PROVIDER")?,
            )
        } else {
            None
        };

        let database_url = env_required("DATABASE_URL")?;
        let port = env_u16("PORT", 8080)?;
        let pipeline_timeout_ms = env_u64("PIPELINE_TIMEOUT_MS", 600_000)?;

        Ok(Self {
            llm_provider,
            llm_api_key,
            llm_model,
            search_provider,
            search_enabled,
            database_url,
            port,
            pipeline_timeout: Duration::from_millis(pipeline_timeout_ms),
        })
    }
}

/// Read a required environment variable, with a descriptive error on
/// failure.
fn env_required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing required environment variable {name}"))
}

fn env_bool(name: &str, default: bool) -> Result<bool> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{name} must be true or false")),
        Err(_) => Ok(default),
    }
}

fn env_u16(name: &str, default: u16) -> Result<u16> {
    match std::env::var(name) {
        Ok(value) => value.parse().with_context(|| format!("{name} must be a u16")),
        Err(_) => Ok(default),
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(value) => value.parse().with_context(|| format!("{name} must be a u64")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variable mutation isn't thread-safe, so serialize these
    // tests against each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            "LLM_PROVIDER",
            "OPENAI_API_KEY",
            "LLM_MODEL",
            "SEARCH_ENABLED",
            "SEARCH_PROVIDER",
            "DATABASE_URL",
            "PORT",
            "PIPELINE_TIMEOUT_MS",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn loads_required_fields_and_applies_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("LLM_PROVIDER", "openai");
        std::env::set_var("OPENAI_API_KEY", "sk-test");
        std::env::set_var("DATABASE_URL", "sqlite://test.db");
        let config = Config::from_env().unwrap();
        assert_eq!(config.llm_provider, LlmProviderKind::OpenAi);
        assert_eq!(config.llm_api_key, "sk-test");
        assert_eq!(config.port, 8080);
        assert!(!config.search_enabled);
        assert_eq!(config.pipeline_timeout, Duration::from_millis(600_000));
        clear_env();
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        assert!(Config::from_env().is_err());
        clear_env();
    }
}
