//! The HTTP surface (§4.9): thin. Validates input, dispatches to the
//! orchestrator, maps errors to status codes. No business logic lives
//! here beyond that mapping.

use std::{collections::HashMap, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    artifact,
    context::RequestContext,
    domain::{ClarificationOutcome, Decision, Question},
    orchestrator::{Orchestrator, Outcome, PipelineError, PipelineInput},
    prelude::*,
    repository::{Repository, RepositoryError},
};

/// Shared application state, handed to every route handler via
/// [`axum::extract::State`] (§4.9 "supplemented").
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub repository: Arc<dyn Repository>,
}

/// Build the router: `/verdict`, `/decisions/{id}`, `/plans/{id}`, and the
/// ambient `/health` probe, wrapped in request tracing and a permissive
/// CORS layer (grounded in the pack's `context-harness` server).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/verdict", post(post_verdict))
        .route("/decisions/{id}", get(get_decision))
        .route("/plans/{id}", get(get_plan))
        .route("/health", get(get_health))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}

// ============ request/response bodies ============

#[derive(Debug, Deserialize)]
struct VerdictRequest {
    input: String,
    #[serde(default)]
    clarification: Option<ClarificationAnswers>,
    #[serde(default)]
    skip_clarify: bool,
}

#[derive(Debug, Deserialize)]
struct ClarificationAnswers {
    answers: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum VerdictResponse {
    ClarificationNeeded {
        status: &'static str,
        reason: String,
        questions: Vec<QuestionBody>,
    },
    Verdict {
        status: &'static str,
        decision_id: Uuid,
        decision: DecisionBody,
        todo: String,
        done_criteria: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
struct QuestionBody {
    id: String,
    question: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<Vec<String>>,
    required: bool,
}

impl From<&Question> for QuestionBody {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            question: question.question.clone(),
            kind: match question.kind {
                crate::domain::QuestionKind::Text => "text",
                crate::domain::QuestionKind::Choice => "choice",
                crate::domain::QuestionKind::MultipleChoice => "multiple_choice",
            },
            options: question.options.clone(),
            required: question.required,
        }
    }
}

/// The decision record as embedded in the `POST /verdict` response (§6):
/// a plain nested JSON object, compactly encoded like the rest of that
/// body. The standalone decision *document* — 2-space-indented, per §4.7 —
/// is a different rendering, served only by `GET /decisions/{id}` via
/// [`artifact::render_decision_document`].
#[derive(Debug, Serialize)]
struct DecisionBody {
    id: Uuid,
    created_at: String,
    input: String,
    verdict: crate::domain::VerdictPayload,
    is_final: bool,
}

impl From<&Decision> for DecisionBody {
    fn from(decision: &Decision) -> Self {
        Self {
            id: decision.id,
            created_at: artifact::format_rfc3339_z(decision.created_at),
            input: decision.input.clone(),
            verdict: decision.verdict.clone(),
            is_final: decision.is_final,
        }
    }
}

// ============ error handling ============

/// Machine-readable error codes (§6), a closed set.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum ErrorCode {
    InputEmpty,
    InputTooLong,
    VerdictFailed,
    NotFound,
    #[allow(dead_code)]
    RateLimited,
    InvalidId,
    InternalError,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

struct ApiError {
    status: StatusCode,
    code: ErrorCode,
    message: String,
    details: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            code: self.code,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Map a [`PipelineError`] to its HTTP status and code, per §6's table.
impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        match &error {
            PipelineError::InputEmpty => {
                ApiError::new(StatusCode::BAD_REQUEST, ErrorCode::InputEmpty, "input is empty")
            }
            PipelineError::InputTooLong => ApiError::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::InputTooLong,
                "input exceeds the maximum length",
            ),
            PipelineError::Timeout => ApiError::new(
                StatusCode::GATEWAY_TIMEOUT,
                ErrorCode::VerdictFailed,
                "the pipeline deadline was exceeded",
            )
            .with_details(error.to_string()),
            PipelineError::VerdictFailed(_) | PipelineError::ExecutionFailed(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::VerdictFailed,
                "failed to produce a verdict",
            )
            .with_details(error.to_string()),
            PipelineError::Cancelled => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::InternalError,
                "the request was cancelled",
            ),
            PipelineError::Internal(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::InternalError,
                "an internal error occurred",
            )
            .with_details(error.to_string()),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound => {
                ApiError::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, "not found")
            }
            RepositoryError::Conflict | RepositoryError::Storage(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::InternalError,
                "an internal error occurred",
            )
            .with_details(error.to_string()),
        }
    }
}

// ============ handlers ============

/// `POST /verdict` (§4.9, §6).
#[instrument(level = "debug", skip_all)]
async fn post_verdict(
    State(state): State<AppState>,
    Json(request): Json<VerdictRequest>,
) -> Result<Json<VerdictResponse>, ApiError> {
    let input = PipelineInput {
        text: request.input,
        clarification_answers: request.clarification.map(|c| c.answers),
        skip_clarify: request.skip_clarify,
    };

    // The request-scoped context for this call: its cancellation handle is
    // what would be wired to a client-disconnect signal if this surface
    // exposed one, and its deadline is a generous outer bound that the
    // orchestrator tightens to its own configured pipeline deadline via
    // `child_with_timeout` (§5).
    let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(3600));
    let outcome = state.orchestrator.run(&ctx, input).await?;

    match outcome {
        Outcome::ClarificationNeeded(ClarificationOutcome::Needed { reason, questions }) => {
            Ok(Json(VerdictResponse::ClarificationNeeded {
                status: "clarification_needed",
                reason,
                questions: questions.iter().map(QuestionBody::from).collect(),
            }))
        }
        Outcome::ClarificationNeeded(ClarificationOutcome::NotNeeded) => {
            // Unreachable: the orchestrator only constructs this variant
            // from a `Needed` clarification outcome.
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::InternalError,
                "an internal error occurred",
            ))
        }
        Outcome::Done(result) => {
            let done_criteria = result.execution.done_criteria.clone();
            let (decision, plan) = artifact::generate(&result.input, result.verdict, &result.execution)
                .map_err(|error| {
                    ApiError::new(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorCode::InternalError,
                        "failed to generate artifacts",
                    )
                    .with_details(error.to_string())
                })?;

            let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(30));
            let (saved_decision, saved_plan) =
                state.repository.save_artifacts(&ctx, decision, plan).await?;

            Ok(Json(VerdictResponse::Verdict {
                status: "verdict",
                decision_id: saved_decision.id,
                decision: DecisionBody::from(&saved_decision),
                todo: saved_plan.content,
                done_criteria,
            }))
        }
    }
}

/// `GET /decisions/{id}` (§4.9, §6): serves the decision record as its own
/// standalone document, 2-space-indented per §4.7, rather than the
/// compactly-encoded summary embedded in the `POST /verdict` response.
#[instrument(level = "debug", skip_all)]
async fn get_decision(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(10));
    let decision = state.repository.get_decision(&ctx, id).await?;
    let document = artifact::render_decision_document(&decision).map_err(|error| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError,
            "failed to render decision document",
        )
        .with_details(error.to_string())
    })?;
    Ok((
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        document,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
struct PlanBody {
    id: Uuid,
    decision_id: Uuid,
    created_at: String,
    content: String,
}

/// `GET /plans/{id}` (§4.9, §6).
#[instrument(level = "debug", skip_all)]
async fn get_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PlanBody>, ApiError> {
    let id = parse_id(&id)?;
    let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(10));
    let plan = state.repository.get_plan(&ctx, id).await?;
    Ok(Json(PlanBody {
        id: plan.id,
        decision_id: plan.decision_id,
        created_at: artifact::format_rfc3339_z(plan.created_at),
        content: plan.content,
    }))
}

/// `GET /health` (§4.9 "supplemented"): a readiness probe the distilled
/// spec's Non-goals don't actually exclude.
#[instrument(level = "debug", skip_all)]
async fn get_health(State(state): State<AppState>) -> Response {
    let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(5));
    match state.repository.ping(&ctx).await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok"}))).into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "degraded"}))).into_response(),
    }
}

/// Parse a path segment as a UUID, mapping failure to `INVALID_ID` (§6).
fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidId, "invalid identifier"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        llm::{LlmGateway, LlmGatewayConfig, LlmProviderKind, mock::MockLlmProvider},
        orchestrator::ClarificationMode,
        repository::memory::InMemoryRepository,
        search::SearchGateway,
    };
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn verdict_and_execution_json() -> &'static str {
        r#"{"ruling": "Use Go", "rationale": "better concurrency",
            "rejected": [{"option": "Python", "reason": "GIL"}, {"option": "Node", "reason": "types"}],
            "mvp_scope": ["Define routes"],
            "phases": [{"name": "Setup", "tasks": ["init repo"]}],
            "done_criteria": ["service responds to /health"]}"#
    }

    fn app(llm_response: &str) -> Router {
        let config = LlmGatewayConfig::new(LlmProviderKind::OpenAi, "test-key".to_owned());
        let llm =
            LlmGateway::with_provider(config, Box::new(MockLlmProvider::always(llm_response.to_owned())));
        let orchestrator = Orchestrator::new(
            llm,
            SearchGateway::disabled(),
            ClarificationMode::Disabled,
            Duration::from_secs(30),
        );
        let state = AppState {
            orchestrator: Arc::new(orchestrator),
            repository: Arc::new(InMemoryRepository::new()),
        };
        router(state)
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let (status, text) = get_raw(app, uri).await;
        let json = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    async fn get_raw(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn happy_path_returns_verdict_and_rendered_plan() {
        let (status, body) = post_json(
            app(verdict_and_execution_json()),
            "/verdict",
            json!({"input": "Should I use Go or Python for a web service?"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "verdict");
        assert!(body["todo"].as_str().unwrap().contains("### Phase 1: Setup"));
        assert_eq!(body["done_criteria"][0], "service responds to /health");
    }

    #[tokio::test]
    async fn empty_input_maps_to_400_input_empty() {
        let (status, body) = post_json(app(verdict_and_execution_json()), "/verdict", json!({"input": "   "})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INPUT_EMPTY");
    }

    #[tokio::test]
    async fn oversize_input_maps_to_400_input_too_long() {
        let (status, body) = post_json(
            app(verdict_and_execution_json()),
            "/verdict",
            json!({"input": "a".repeat(10_001)}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INPUT_TOO_LONG");
    }

    #[tokio::test]
    async fn invalid_ruling_maps_to_500_verdict_failed() {
        let (status, body) = post_json(
            app(r#"{"ruling": "   ", "rationale": "x"}"#),
            "/verdict",
            json!({"input": "anything"}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "VERDICT_FAILED");
    }

    #[tokio::test]
    async fn unknown_decision_id_is_404() {
        let (status, body) = get(app(verdict_and_execution_json()), &format!("/decisions/{}", Uuid::new_v4())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn malformed_decision_id_is_400_invalid_id() {
        let (status, body) = get(app(verdict_and_execution_json()), "/decisions/not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_ID");
    }

    #[tokio::test]
    async fn decision_round_trips_through_get_decisions() {
        let app_instance = app(verdict_and_execution_json());
        let (status, body) = post_json(
            app_instance.clone(),
            "/verdict",
            json!({"input": "Should I use Go or Python for a web service?"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let decision_id = body["decision_id"].as_str().unwrap();

        let (status, body) = get(app_instance, &format!("/decisions/{decision_id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verdict"]["ruling"], "Use Go");
        assert_eq!(body["is_final"], true);
    }

    #[tokio::test]
    async fn decision_document_is_served_two_space_indented() {
        let app_instance = app(verdict_and_execution_json());
        let (_, body) = post_json(
            app_instance.clone(),
            "/verdict",
            json!({"input": "Should I use Go or Python for a web service?"}),
        )
        .await;
        let decision_id = body["decision_id"].as_str().unwrap();

        let (status, text) = get_raw(app_instance, &format!("/decisions/{decision_id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.starts_with("{\n  \"created_at\""));
        assert!(text.contains("\n  \"id\": "));
    }

    #[tokio::test]
    async fn health_check_reports_ok_against_a_healthy_repository() {
        let (status, body) = get(app(verdict_and_execution_json()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
