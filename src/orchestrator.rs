//! The Orchestrator (§4.3): sequences the three stages under a single
//! deadline, validates each output, classifies and propagates errors.
//!
//! This is the hard part of the crate, per the design notes: it composes
//! unreliable external calls into a flow with fail-fast validation, bounded
//! latency, and provider-agnostic interfaces. Everything else in this crate
//! exists to serve this module.

use std::{collections::HashMap, time::Duration, time::Instant as StdInstant};

use crate::{
    context::RequestContext,
    domain::{ClarificationOutcome, PipelineResult},
    llm::{LlmError, LlmGateway},
    prelude::*,
    search::{SearchError, SearchGateway},
    stages::{self, StageError},
};

/// The maximum input length, in Unicode codepoints (§4.3).
const MAX_INPUT_CODEPOINTS: usize = 10_000;

/// The pipeline's default end-to-end deadline (§4.3, §5).
pub const DEFAULT_PIPELINE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Errors surfaced by the orchestrator (§7's taxonomy, the subset the
/// orchestrator itself is responsible for classifying into).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Input was empty or whitespace-only.
    #[error("input is empty")]
    InputEmpty,
    /// Input exceeded the codepoint limit.
    #[error("input exceeds {MAX_INPUT_CODEPOINTS} codepoints")]
    InputTooLong,
    /// The verdict stage failed, either the call itself or validation.
    #[error("verdict stage failed: {0}")]
    VerdictFailed(#[source] StageError),
    /// The execution stage failed, either the call itself or validation.
    #[error("execution stage failed: {0}")]
    ExecutionFailed(#[source] StageError),
    /// The pipeline deadline elapsed.
    #[error("pipeline deadline exceeded")]
    Timeout,
    /// The request was cancelled.
    #[error("pipeline request was cancelled")]
    Cancelled,
    /// Any other unclassified failure.
    #[error("internal pipeline error: {0}")]
    Internal(String),
}

/// Either the pipeline asked for clarification, or it produced a full
/// result. Modeled as a sum type rather than an optional-field struct, per
/// the design notes' preference for tagged unions (§9).
#[derive(Debug)]
pub enum Outcome {
    /// More context is needed before a ruling can be made.
    ClarificationNeeded(ClarificationOutcome),
    /// The pipeline ran to completion.
    Done(PipelineResult),
}

/// Input to a single orchestrator run (§4.3's contract).
#[derive(Debug, Default)]
pub struct PipelineInput {
    /// The raw user-supplied problem statement.
    pub text: String,
    /// Answers to a prior round of clarification questions, keyed by
    /// question id.
    pub clarification_answers: Option<HashMap<String, String>>,
    /// If true, never triage for clarification even if enabled.
    pub skip_clarify: bool,
}

/// Whether the clarification stage runs at all. Disabled in deployments that
/// never want a clarification round-trip, per the orchestrator's state
/// machine (§4.3): "if enabled and answers absent and skip_clarify=false."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarificationMode {
    Enabled,
    Disabled,
}

/// The orchestrator: sequences clarification, search, verdict and execution
/// under one deadline.
pub struct Orchestrator {
    llm: LlmGateway,
    search: SearchGateway,
    clarification_mode: ClarificationMode,
    pipeline_timeout: Duration,
}

impl Orchestrator {
    /// Build an orchestrator from its gateways and configuration.
    pub fn new(
        llm: LlmGateway,
        search: SearchGateway,
        clarification_mode: ClarificationMode,
        pipeline_timeout: Duration,
    ) -> Self {
        Self {
            llm,
            search,
            clarification_mode,
            pipeline_timeout,
        }
    }

    /// Run the pipeline end to end (§4.3's state machine). `ctx` is the
    /// caller's context — the orchestrator binds it to the configured
    /// pipeline deadline (§5) via [`RequestContext::child_with_timeout`]
    /// rather than starting a fresh, unconnected one, so cancelling `ctx`
    /// from the outside (e.g. a dropped HTTP connection) actually reaches
    /// every stage call made under it.
    #[instrument(level = "debug", skip_all)]
    pub async fn run(
        &self,
        ctx: &RequestContext,
        input: PipelineInput,
    ) -> Result<Outcome, PipelineError> {
        let started_at = StdInstant::now();
        let ctx = ctx.child_with_timeout(self.pipeline_timeout);

        let trimmed = input.text.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::InputEmpty);
        }
        if trimmed.chars().count() > MAX_INPUT_CODEPOINTS {
            return Err(PipelineError::InputTooLong);
        }

        let enriched = enrich_input(trimmed, input.clarification_answers.as_ref());

        let answers_supplied = input.clarification_answers.is_some();
        let should_triage = self.clarification_mode == ClarificationMode::Enabled
            && !answers_supplied
            && !input.skip_clarify;

        if should_triage {
            match stages::clarification::run(&self.llm, &ctx, &enriched).await {
                Ok(ClarificationOutcome::Needed { reason, questions }) => {
                    return Ok(Outcome::ClarificationNeeded(ClarificationOutcome::Needed {
                        reason,
                        questions,
                    }));
                }
                Ok(ClarificationOutcome::NotNeeded) => {
                    // Fall through to search/verdict/execution below.
                }
                Err(error) => {
                    // Clarification failures are recovered locally (§7, §9
                    // open question): log and proceed as if clarification
                    // were not needed.
                    warn!(
                        error = %error,
                        "clarification stage failed; proceeding without triage"
                    );
                }
            }
        }

        let search_results = self.search_if_enabled(&ctx, &enriched).await;

        let verdict = match stages::verdict::run(&self.llm, &ctx, &enriched, search_results.as_ref())
            .await
        {
            Ok(verdict) => verdict,
            Err(error) => return Err(classify(&ctx, error, PipelineError::VerdictFailed)),
        };

        let execution = match stages::execution::run(&self.llm, &ctx, &verdict).await {
            Ok(execution) => execution,
            Err(error) => return Err(classify(&ctx, error, PipelineError::ExecutionFailed)),
        };

        Ok(Outcome::Done(PipelineResult {
            input: enriched,
            verdict,
            execution,
            duration: started_at.elapsed(),
        }))
    }

    /// Run the search stage if the gateway is not the disabled sentinel.
    /// Best-effort (§4.2): any error means "proceed without context," logged
    /// as a recovered-locally event.
    async fn search_if_enabled(
        &self,
        ctx: &RequestContext,
        query: &str,
    ) -> Option<crate::domain::SearchResultSet> {
        match self.search.search(ctx, query).await {
            Ok(results) => Some(results),
            Err(SearchError::DeadlineExceeded) if ctx.is_deadline_exceeded() => {
                // The pipeline deadline fired during search; let the verdict
                // stage call fail fast on the same deadline rather than
                // silently spend the rest of the budget.
                warn!("search deadline exceeded while pipeline deadline also elapsed");
                None
            }
            Err(error) => {
                warn!(error = %error, "search stage failed; proceeding without search context");
                None
            }
        }
    }
}

/// Append clarification answers to the original input, per §4.3: a
/// separator line followed by `- question_id: answer` lines.
fn enrich_input(input: &str, answers: Option<&HashMap<String, String>>) -> String {
    let Some(answers) = answers.filter(|answers| !answers.is_empty()) else {
        return input.to_owned();
    };
    let mut ids: Vec<&String> = answers.keys().collect();
    ids.sort();

    let mut out = String::from(input);
    out.push_str("\n\n---\nClarification answers:\n");
    for id in ids {
        out.push_str(&format!("- {id}: {}\n", answers[id]));
    }
    out
}

/// Error classification (§4.3): deadline and cancellation dominate, then
/// wrap the stage failure with its originating stage identity.
fn classify<F>(ctx: &RequestContext, error: StageError, wrap: F) -> PipelineError
where
    F: FnOnce(StageError) -> PipelineError,
{
    if ctx.is_deadline_exceeded() || matches!(error, StageError::Llm(LlmError::DeadlineExceeded)) {
        return PipelineError::Timeout;
    }
    if ctx.is_cancelled() || matches!(error, StageError::Llm(LlmError::Cancelled)) {
        return PipelineError::Cancelled;
    }
    wrap(error)
}
