//! The verdict stage (§4.5): produces a singular ruling with rationale and
//! explicit rejections.

use schemars::JsonSchema;

use crate::{
    context::RequestContext,
    domain::{RejectedOption, SearchResultSet, VerdictPayload},
    llm::LlmGateway,
    prelude::*,
};

use super::{StageError, prompts};

#[derive(Debug, Deserialize, JsonSchema)]
struct RawVerdict {
    ruling: Option<String>,
    rationale: Option<String>,
    #[serde(default)]
    rejected: Vec<RawRejectedOption>,
    #[serde(default)]
    ranking: Option<Vec<u32>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RawRejectedOption {
    option: Option<String>,
    reason: Option<String>,
}

/// Run the verdict stage over `input`, optionally enriched with search
/// results.
#[instrument(level = "debug", skip_all)]
pub async fn run(
    gateway: &LlmGateway,
    ctx: &RequestContext,
    input: &str,
    search_results: Option<&SearchResultSet>,
) -> Result<VerdictPayload, StageError> {
    let language = prompts::select_language(input);
    let fragment = search_results.map(SearchResultSet::to_prompt_fragment);
    let prompt = prompts::verdict_prompt(language, input, fragment.as_deref());
    let raw: RawVerdict = gateway.complete_json(ctx, &prompt).await?;

    let ruling = raw.ruling.unwrap_or_default();
    let rationale = raw.rationale.unwrap_or_default();
    if ruling.trim().is_empty() {
        return Err(StageError::Invalid("verdict ruling was empty".to_owned()));
    }
    if rationale.trim().is_empty() {
        return Err(StageError::Invalid("verdict rationale was empty".to_owned()));
    }

    let rejected = raw
        .rejected
        .into_iter()
        .filter_map(|raw_rejected| {
            let option = raw_rejected.option?;
            let reason = raw_rejected.reason?;
            if option.trim().is_empty() || reason.trim().is_empty() {
                return None;
            }
            Some(RejectedOption { option, reason })
        })
        .collect();

    Ok(VerdictPayload {
        ruling,
        rationale,
        rejected,
        ranking: raw.ranking,
    })
}
