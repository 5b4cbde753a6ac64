//! The clarification stage (§4.4): decides whether more context is needed
//! before a ruling can be made.

use schemars::JsonSchema;

use crate::{
    context::RequestContext,
    domain::{ClarificationOutcome, Question, QuestionKind},
    llm::LlmGateway,
    prelude::*,
};

use super::{StageError, prompts};

/// The permissive wire shape the model's JSON is first parsed into. Every
/// field is optional: missing-required-field handling is this stage's job,
/// not the LLM Gateway's (§4.1).
#[derive(Debug, Deserialize, JsonSchema)]
struct RawClarification {
    needs_clarification: Option<bool>,
    reason: Option<String>,
    questions: Option<Vec<RawQuestion>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RawQuestion {
    id: Option<String>,
    question: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    options: Option<Vec<String>>,
    required: Option<bool>,
}

/// Run the clarification stage over `input`.
#[instrument(level = "debug", skip_all)]
pub async fn run(
    gateway: &LlmGateway,
    ctx: &RequestContext,
    input: &str,
) -> Result<ClarificationOutcome, StageError> {
    let language = prompts::select_language(input);
    let prompt = prompts::clarification_prompt(language, input);
    let raw: RawClarification = gateway.complete_json(ctx, &prompt).await?;

    if !raw.needs_clarification.unwrap_or(false) {
        return Ok(ClarificationOutcome::NotNeeded);
    }

    let reason = raw.reason.unwrap_or_default();
    let questions: Vec<Question> = raw
        .questions
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .filter_map(|(i, raw_question)| convert_question(i, raw_question))
        .collect();

    if questions.is_empty() {
        return Err(StageError::Invalid(
            "clarification needed but no usable questions were returned".to_owned(),
        ));
    }

    Ok(ClarificationOutcome::Needed { reason, questions })
}

/// Convert a single raw question, assigning a default id and defaulting a
/// missing `type` to `text` (§4.4). Questions with a choice-like type but no
/// usable options are dropped as best-effort, rather than failing the whole
/// stage.
fn convert_question(index: usize, raw: RawQuestion) -> Option<Question> {
    let question_text = raw.question?;
    if question_text.trim().is_empty() {
        return None;
    }

    let id = match raw.id {
        Some(id) if !id.trim().is_empty() => id,
        _ => format!("q{}", index + 1),
    };

    let kind = match raw.kind.as_deref() {
        Some("choice") => QuestionKind::Choice,
        Some("multiple_choice") => QuestionKind::MultipleChoice,
        _ => QuestionKind::Text,
    };

    let options = raw.options.filter(|options| !options.is_empty());
    if kind != QuestionKind::Text && options.is_none() {
        warn!(question_id = %id, "dropping clarification question with choice type but no options");
        return None;
    }

    Some(Question {
        id,
        question: question_text,
        kind,
        options,
        required: raw.required.unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{llm::LlmGatewayConfig, llm::LlmProviderKind, llm::mock::MockLlmProvider};

    fn gateway_with(response: &str) -> LlmGateway {
        let config = LlmGatewayConfig::new(LlmProviderKind::OpenAi, "test-key".to_owned());
        LlmGateway::with_provider(config, Box::new(MockLlmProvider::always(response.to_owned())))
    }

    #[tokio::test]
    async fn not_needed_response_yields_not_needed_outcome() {
        let gateway = gateway_with(r#"{"needs_clarification": false}"#);
        let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(5));
        let outcome = run(&gateway, &ctx, "Should I use Go or Python?").await.unwrap();
        assert!(matches!(outcome, ClarificationOutcome::NotNeeded));
    }

    #[tokio::test]
    async fn assigns_ids_and_defaults_type_to_text() {
        let gateway = gateway_with(
            r#"{"needs_clarification": true, "reason": "ambiguous", "questions": [
                {"question": "What is your budget?"},
                {"question": "Pick a region", "type": "choice", "options": ["us", "eu"]}
            ]}"#,
        );
        let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(5));
        let outcome = run(&gateway, &ctx, "vague input").await.unwrap();
        match outcome {
            ClarificationOutcome::Needed { reason, questions } => {
                assert_eq!(reason, "ambiguous");
                assert_eq!(questions.len(), 2);
                assert_eq!(questions[0].id, "q1");
                assert_eq!(questions[0].kind, QuestionKind::Text);
                assert_eq!(questions[1].id, "q2");
                assert_eq!(questions[1].kind, QuestionKind::Choice);
                assert_eq!(questions[1].options.as_deref(), Some(&["us".to_owned(), "eu".to_owned()][..]));
            }
            ClarificationOutcome::NotNeeded => panic!("expected Needed"),
        }
    }

    #[tokio::test]
    async fn drops_choice_question_missing_options() {
        let gateway = gateway_with(
            r#"{"needs_clarification": true, "reason": "ambiguous", "questions": [
                {"question": "Pick one", "type": "choice"},
                {"question": "Describe it"}
            ]}"#,
        );
        let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(5));
        let outcome = run(&gateway, &ctx, "vague input").await.unwrap();
        match outcome {
            ClarificationOutcome::Needed { questions, .. } => {
                assert_eq!(questions.len(), 1);
                assert_eq!(questions[0].question, "Describe it");
            }
            ClarificationOutcome::NotNeeded => panic!("expected Needed"),
        }
    }

    #[tokio::test]
    async fn needs_clarification_with_no_usable_questions_is_invalid() {
        let gateway = gateway_with(r#"{"needs_clarification": true, "questions": []}"#);
        let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(5));
        let result = run(&gateway, &ctx, "vague input").await;
        assert!(matches!(result, Err(StageError::Invalid(_))));
    }
}
