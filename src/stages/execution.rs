//! The execution stage (§4.6): produces MVP scope, phases and done-criteria
//! from an already-validated verdict.

use schemars::JsonSchema;

use crate::{
    context::RequestContext,
    domain::{ExecutionOutput, Phase, VerdictPayload},
    llm::LlmGateway,
    prelude::*,
};

use super::{StageError, prompts};

const MAX_PHASES: usize = 3;
const MAX_TASKS_PER_PHASE: usize = 5;

#[derive(Debug, Deserialize, JsonSchema)]
struct RawExecution {
    #[serde(default)]
    mvp_scope: Vec<String>,
    #[serde(default)]
    phases: Vec<RawPhase>,
    #[serde(default)]
    done_criteria: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RawPhase {
    name: Option<String>,
    #[serde(default)]
    tasks: Vec<String>,
}

/// Run the execution stage over an already-validated verdict.
#[instrument(level = "debug", skip_all)]
pub async fn run(
    gateway: &LlmGateway,
    ctx: &RequestContext,
    verdict: &VerdictPayload,
) -> Result<ExecutionOutput, StageError> {
    let language = prompts::select_language(&verdict.ruling);
    let prompt = prompts::execution_prompt(language, &verdict.ruling, &verdict.rationale);
    let raw: RawExecution = gateway.complete_json(ctx, &prompt).await?;

    let mvp_scope: Vec<String> = raw
        .mvp_scope
        .into_iter()
        .filter(|item| !item.trim().is_empty())
        .collect();
    if mvp_scope.is_empty() {
        return Err(StageError::Invalid("execution MVP scope was empty".to_owned()));
    }

    if raw.phases.is_empty() || raw.phases.len() > MAX_PHASES {
        return Err(StageError::Invalid(format!(
            "execution phase count {} is outside 1..={MAX_PHASES}",
            raw.phases.len()
        )));
    }

    let mut phases = Vec::with_capacity(raw.phases.len());
    for raw_phase in raw.phases {
        let name = raw_phase.name.unwrap_or_default();
        if name.trim().is_empty() {
            return Err(StageError::Invalid("execution phase name was empty".to_owned()));
        }
        let tasks: Vec<String> = raw_phase
            .tasks
            .into_iter()
            .filter(|task| !task.trim().is_empty())
            .collect();
        if tasks.is_empty() || tasks.len() > MAX_TASKS_PER_PHASE {
            return Err(StageError::Invalid(format!(
                "phase \"{name}\" task count {} is outside 1..={MAX_TASKS_PER_PHASE}",
                tasks.len()
            )));
        }
        phases.push(Phase { name, tasks });
    }

    let done_criteria: Vec<String> = raw
        .done_criteria
        .into_iter()
        .filter(|item| !item.trim().is_empty())
        .collect();
    if done_criteria.is_empty() {
        return Err(StageError::Invalid("execution done-criteria were empty".to_owned()));
    }

    Ok(ExecutionOutput {
        mvp_scope,
        phases,
        done_criteria,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmGatewayConfig, LlmProviderKind, mock::MockLlmProvider};

    fn gateway_with(response: &str) -> LlmGateway {
        let config = LlmGatewayConfig::new(LlmProviderKind::OpenAi, "test-key".to_owned());
        LlmGateway::with_provider(config, Box::new(MockLlmProvider::always(response.to_owned())))
    }

    fn verdict() -> VerdictPayload {
        VerdictPayload {
            ruling: "Use Go".to_owned(),
            rationale: "better concurrency".to_owned(),
            rejected: vec![],
            ranking: None,
        }
    }

    #[tokio::test]
    async fn produces_valid_execution_output() {
        let gateway = gateway_with(
            r#"{"mvp_scope": ["Define routes"], "phases": [{"name": "Setup", "tasks": ["init repo"]}],
                "done_criteria": ["service responds to /health"]}"#,
        );
        let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(5));
        let output = run(&gateway, &ctx, &verdict()).await.unwrap();
        assert_eq!(output.phases.len(), 1);
        assert_eq!(output.phases[0].name, "Setup");
    }

    #[tokio::test]
    async fn four_phases_is_invalid() {
        let phases: Vec<_> = (0..4)
            .map(|i| format!(r#"{{"name": "Phase {i}", "tasks": ["t"]}}"#))
            .collect();
        let response = format!(
            r#"{{"mvp_scope": ["x"], "phases": [{}], "done_criteria": ["y"]}}"#,
            phases.join(",")
        );
        let gateway = gateway_with(&response);
        let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(5));
        let result = run(&gateway, &ctx, &verdict()).await;
        assert!(matches!(result, Err(StageError::Invalid(_))));
    }

    #[tokio::test]
    async fn six_tasks_in_one_phase_is_invalid() {
        let tasks: Vec<_> = (0..6).map(|i| format!("\"t{i}\"")).collect();
        let response = format!(
            r#"{{"mvp_scope": ["x"], "phases": [{{"name": "Setup", "tasks": [{}]}}], "done_criteria": ["y"]}}"#,
            tasks.join(",")
        );
        let gateway = gateway_with(&response);
        let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(5));
        let result = run(&gateway, &ctx, &verdict()).await;
        assert!(matches!(result, Err(StageError::Invalid(_))));
    }

    #[tokio::test]
    async fn empty_phase_name_is_invalid() {
        let gateway = gateway_with(
            r#"{"mvp_scope": ["x"], "phases": [{"name": "  ", "tasks": ["t"]}], "done_criteria": ["y"]}"#,
        );
        let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(5));
        let result = run(&gateway, &ctx, &verdict()).await;
        assert!(matches!(result, Err(StageError::Invalid(_))));
    }
}
