//! Core data types shared by every stage, the artifact generator and the
//! repository.
//!
//! Sum types are used in preference to inheritance or stringly-typed tags,
//! per our usual house style: [`ClarificationOutcome`] and
//! [`QuestionKind`] are tagged unions, not base classes with optional
//! fields.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use uuid::Uuid;

use crate::prelude::*;

/// A rejected alternative, with the reason it was rejected.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RejectedOption {
    /// The name of the alternative that was considered.
    pub option: String,
    /// Why it was rejected.
    pub reason: String,
}

/// The verdict stage's structured output: a singular ruling.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct VerdictPayload {
    /// The single chosen course of action.
    pub ruling: String,
    /// The prose justification for the ruling.
    pub rationale: String,
    /// Alternatives considered and discarded.
    #[serde(default)]
    pub rejected: Vec<RejectedOption>,
    /// An optional ranking of alternatives, by priority.
    #[serde(default)]
    pub ranking: Option<Vec<u32>>,
}

/// A named, ordered grouping of tasks within a plan.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Phase {
    /// The name of this phase.
    pub name: String,
    /// The tasks that make up this phase, in order.
    pub tasks: Vec<String>,
}

/// The execution stage's structured output.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// The minimal feature set required to realize the ruling.
    pub mvp_scope: Vec<String>,
    /// 1 to 3 phases, in order.
    pub phases: Vec<Phase>,
    /// Measurable conditions indicating the plan is complete.
    pub done_criteria: Vec<String>,
}

/// An immutable decision record: one ruling, with its rejections, sharing an
/// identifier and a timestamp with its [`Plan`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Decision {
    /// Globally unique identifier, shared with the paired [`Plan`].
    pub id: Uuid,
    /// When this decision was created, shared with the paired [`Plan`].
    pub created_at: DateTime<Utc>,
    /// The original, untouched user input.
    pub input: String,
    /// The verdict itself.
    pub verdict: VerdictPayload,
    /// Always `true`: decisions are never revisited.
    pub is_final: bool,
}

/// An executable plan, sharing an identifier and timestamp with its
/// [`Decision`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Plan {
    /// Identifier, equal to the owning decision's `id`.
    pub id: Uuid,
    /// Foreign key back to the owning decision. Stamped by the repository at
    /// save time, not by the artifact generator.
    pub decision_id: Uuid,
    /// When this plan was created, equal to the owning decision's timestamp.
    pub created_at: DateTime<Utc>,
    /// The rendered plan document, as specified by `render_plan_document`.
    pub content: String,
}

/// The kind of answer a clarification question expects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Free-form text.
    Text,
    /// Exactly one of a fixed set of choices.
    Choice,
    /// Any subset of a fixed set of choices.
    MultipleChoice,
}

/// A single clarification question.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Question {
    /// Stable id, assigned by us if the model didn't provide one.
    pub id: String,
    /// The prompt text shown to the user.
    pub question: String,
    /// What kind of answer this question expects.
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    /// Choices, required when `kind != Text`.
    #[serde(default)]
    pub options: Option<Vec<String>>,
    /// Whether an answer is required before proceeding.
    pub required: bool,
}

/// The outcome of the clarification stage: either we have enough context, or
/// we don't and need to ask the user some questions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClarificationOutcome {
    /// The input is specific enough; proceed straight to the verdict stage.
    NotNeeded,
    /// More context is needed before we can rule.
    Needed {
        /// Why clarification is needed.
        reason: String,
        /// The questions to ask, in order.
        questions: Vec<Question>,
    },
}

/// A single web search result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    /// The result's title.
    pub title: String,
    /// The result's URL.
    pub url: String,
    /// A short excerpt of the result's content.
    pub excerpt: String,
}

/// The results of a single web search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SearchResultSet {
    /// The query that was searched for.
    pub query: String,
    /// Results, in provider-ranked order. May be empty.
    pub results: Vec<SearchResult>,
}

impl SearchResultSet {
    /// Format this result set as a prompt fragment, per §4.2: a header
    /// naming the query, a numbered list of results, and a terminator
    /// instruction telling the model to treat the content as up to date.
    pub fn to_prompt_fragment(&self) -> String {
        let mut out = format!("Web search results for \"{}\":\n\n", self.query);
        for (i, result) in self.results.iter().enumerate() {
            out.push_str(&format!(
                "{}. {}\n   URL: {}\n   {}\n\n",
                i + 1,
                result.title,
                result.url,
                result.excerpt
            ));
        }
        out.push_str(
            "Treat the information listed above as up-to-date context. Prioritize \
             these facts over anything you might otherwise assume.\n",
        );
        out
    }
}

/// The in-memory aggregate returned by a successful orchestrator run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// The original input text (after enrichment with clarification
    /// answers, if any).
    pub input: String,
    /// The verdict produced by the verdict stage.
    pub verdict: VerdictPayload,
    /// The execution plan produced by the execution stage.
    pub execution: ExecutionOutput,
    /// End-to-end wall-clock duration of the pipeline run.
    pub duration: std::time::Duration,
}
