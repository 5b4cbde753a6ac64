//! The Artifact Generator (§4.7): renders the decision record and the plan
//! document from a pipeline result, sharing one freshly assigned identifier
//! and creation time. Generation is atomic at the type level: this module
//! has no partial-failure path — either both values come back, or this
//! function is never reached because an earlier stage already failed.

use chrono::Utc;
use handlebars::Handlebars;
use serde_json::json;
use uuid::Uuid;

use crate::{
    domain::{Decision, Plan, VerdictPayload},
    prelude::*,
};

/// The plan document template (§4.7), compiled once and reused rather than
/// built with ad hoc `format!` concatenation — the teacher reaches for
/// `handlebars` for every templated-text need, and this is no exception.
const PLAN_TEMPLATE: &str = r#"# Execution Plan: {{ruling}}
Generated: {{created_at}}
Decision ID: {{id}}

## MVP Scope
{{#each mvp_scope}}
- {{this}}
{{/each}}
## Phases
{{#each phases}}
### Phase {{inc @index}}: {{this.name}}
{{#each this.tasks}}
- [ ] {{this}}
{{/each}}
{{/each}}
## Done Criteria
{{#each done_criteria}}
- {{this}}
{{/each}}
"#;

/// Generate a `(Decision, Plan)` pair sharing a fresh identifier and
/// creation time, from a validated verdict and execution output.
pub fn generate(
    input: &str,
    verdict: VerdictPayload,
    execution: &crate::domain::ExecutionOutput,
) -> Result<(Decision, Plan)> {
    let id = Uuid::new_v4();
    let created_at = Utc::now();

    let decision = Decision {
        id,
        created_at,
        input: input.to_owned(),
        verdict,
        is_final: true,
    };

    let content = render_plan_document(&decision, execution)?;
    let plan = Plan {
        id,
        decision_id: id,
        created_at,
        content,
    };

    Ok((decision, plan))
}

/// Render the decision record as its own standalone document (§4.7):
/// 2-space-indented JSON, with `created_at` formatted as RFC-3339 UTC with
/// a trailing `Z` rather than `chrono`'s default `+00:00` offset. `rejected`
/// falls out as `[]` rather than `null` for free, since `Decision`'s
/// `rejected` field is a plain `Vec`, never an `Option`.
pub fn render_decision_document(decision: &Decision) -> Result<String> {
    let document = json!({
        "id": decision.id,
        "created_at": format_rfc3339_z(decision.created_at),
        "input": decision.input,
        "verdict": decision.verdict,
        "is_final": decision.is_final,
    });
    serde_json::to_string_pretty(&document).context("failed to render decision document")
}

/// Render the plan document template for a decision and its execution
/// output (§4.7). `created_at` is formatted as RFC-3339 UTC with a
/// trailing `Z`, per invariant 4.
fn render_plan_document(
    decision: &Decision,
    execution: &crate::domain::ExecutionOutput,
) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.register_helper("inc", Box::new(inc_helper));
    handlebars
        .register_template_string("plan", PLAN_TEMPLATE)
        .context("failed to compile plan document template")?;

    let data = json!({
        "id": decision.id.to_string(),
        "created_at": format_rfc3339_z(decision.created_at),
        "ruling": decision.verdict.ruling,
        "mvp_scope": execution.mvp_scope,
        "phases": execution.phases,
        "done_criteria": execution.done_criteria,
    });

    handlebars
        .render("plan", &data)
        .context("failed to render plan document")
}

/// Format a UTC timestamp as RFC-3339 with a trailing `Z`, per invariant 4
/// (`chrono`'s default RFC-3339 formatter uses `+00:00`, not `Z`, for UTC).
pub fn format_rfc3339_z(timestamp: chrono::DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// A tiny Handlebars helper: 1-based index, so `{{#each phases}}` numbers
/// phases `1..N` (invariant 5) instead of Handlebars' native 0-based
/// `@index`.
fn inc_helper(
    helper: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let index = helper
        .param(0)
        .and_then(|value| value.value().as_u64())
        .unwrap_or(0);
    out.write(&(index + 1).to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecutionOutput, Phase, RejectedOption};

    fn verdict() -> VerdictPayload {
        VerdictPayload {
            ruling: "Use Go".to_owned(),
            rationale: "Better concurrency story".to_owned(),
            rejected: vec![RejectedOption {
                option: "Python".to_owned(),
                reason: "GIL limits throughput".to_owned(),
            }],
            ranking: None,
        }
    }

    fn execution() -> ExecutionOutput {
        ExecutionOutput {
            mvp_scope: vec!["Define routes".to_owned()],
            phases: vec![Phase {
                name: "Setup".to_owned(),
                tasks: vec!["init repo".to_owned()],
            }],
            done_criteria: vec!["service responds to /health".to_owned()],
        }
    }

    #[test]
    fn generates_matching_id_and_timestamp() {
        let (decision, plan) = generate("Go or Python?", verdict(), &execution()).unwrap();
        assert_eq!(decision.id, plan.id);
        assert_eq!(decision.id, plan.decision_id);
        assert_eq!(decision.created_at, plan.created_at);
        assert!(decision.is_final);
    }

    #[test]
    fn plan_document_has_expected_sections_and_one_based_phase_numbering() {
        let (_decision, plan) = generate("Go or Python?", verdict(), &execution()).unwrap();
        assert!(plan.content.starts_with("# Execution Plan: Use Go"));
        assert!(plan.content.contains("### Phase 1: Setup"));
        assert!(plan.content.contains("- [ ] init repo"));
        assert!(plan.content.contains("## Done Criteria"));
        assert!(plan.content.contains("service responds to /health"));
    }

    #[test]
    fn phases_are_numbered_in_order_for_multiple_phases() {
        let execution = ExecutionOutput {
            mvp_scope: vec!["a".to_owned()],
            phases: vec![
                Phase { name: "First".to_owned(), tasks: vec!["t1".to_owned()] },
                Phase { name: "Second".to_owned(), tasks: vec!["t2".to_owned()] },
            ],
            done_criteria: vec!["c".to_owned()],
        };
        let (_decision, plan) = generate("x", verdict(), &execution).unwrap();
        assert!(plan.content.contains("### Phase 1: First"));
        assert!(plan.content.contains("### Phase 2: Second"));
    }

    #[test]
    fn decision_document_is_two_space_indented_and_round_trips() {
        let (decision, _plan) = generate("Go or Python?", verdict(), &execution()).unwrap();
        let document = render_decision_document(&decision).unwrap();

        assert!(document.starts_with("{\n  \"created_at\""));
        assert!(document.contains("\n  \"id\": "));
        assert!(document.contains("\n  \"verdict\": {\n    \"ranking\": null,"));

        let parsed: serde_json::Value = serde_json::from_str(&document).unwrap();
        assert_eq!(parsed["id"], decision.id.to_string());
        assert_eq!(parsed["input"], "Go or Python?");
        assert_eq!(parsed["is_final"], true);
        assert_eq!(parsed["verdict"]["ruling"], "Use Go");
        assert_eq!(parsed["verdict"]["rationale"], "Better concurrency story");
        assert_eq!(parsed["verdict"]["rejected"][0]["option"], "Python");
        assert_eq!(
            parsed["created_at"].as_str().unwrap(),
            format_rfc3339_z(decision.created_at)
        );
    }

    #[test]
    fn timestamp_round_trips_through_rfc3339_with_trailing_z() {
        let (decision, _plan) = generate("x", verdict(), &execution()).unwrap();
        let formatted = format_rfc3339_z(decision.created_at);
        assert!(formatted.ends_with('Z'));
        let parsed = chrono::DateTime::parse_from_rfc3339(&formatted).unwrap();
        assert_eq!(parsed.timestamp(), decision.created_at.timestamp());
    }
}
