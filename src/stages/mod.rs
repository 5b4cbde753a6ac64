//! The three LLM-backed stages (§4.4–4.6): clarification triage, verdict,
//! and execution planning. Each stage owns its prompt construction, its
//! permissive "raw" wire shape for parsing the model's JSON, and the
//! semantic validation that turns a raw value into a strict domain type.

pub mod clarification;
pub mod execution;
pub mod prompts;
pub mod verdict;

use crate::llm::LlmError;

/// A stage failed either because the LLM call itself failed, or because its
/// structurally-valid-JSON response failed our semantic validation.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The underlying LLM call failed.
    #[error(transparent)]
    Llm(#[from] LlmError),
    /// The model's response parsed as JSON but failed validation.
    #[error("invalid stage output: {0}")]
    Invalid(String),
}
