//! Axum handlers for the model routing API

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use conduit_core::HttpError;
use conduit_routing::{SuggestionRecord, SuggestionRequest};

use crate::api::ProcessRequest;
use crate::error::LlmError;
use crate::state::Orchestrator;

/// Build the router with every model endpoint
pub fn llm_router(state: Orchestrator) -> Router {
    Router::new()
        .route("/models", routing::get(list_models))
        .route("/models/status", routing::get(model_status))
        .route("/models/{*path}", routing::post(benchmark_model))
        .route("/process", routing::post(process))
        .route("/suggest", routing::post(suggest))
        .route("/suggest-feedback", routing::post(suggest_feedback))
        .with_state(state)
}

/// Handle `GET /models`
async fn list_models(State(state): State<Orchestrator>) -> Response {
    Json(serde_json::json!({ "models": state.models() })).into_response()
}

/// Handle `GET /models/status`
async fn model_status(State(state): State<Orchestrator>) -> Response {
    Json(state.status()).into_response()
}

/// Handle `POST /models/{id}/benchmark`
///
/// Ids may contain `/`, so the whole tail is captured and the suffix split off here.
async fn benchmark_model(State(state): State<Orchestrator>, Path(path): Path<String>) -> Response {
    let Some(model_id) = path.trim_start_matches('/').strip_suffix("/benchmark") else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match state.benchmark(model_id).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(e),
    }
}

/// Handle `POST /process`
async fn process(State(state): State<Orchestrator>, body: Result<Json<ProcessRequest>, JsonRejection>) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return error_response(rejected(&rejection)),
    };

    match state.process(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

/// Handle `POST /suggest`
async fn suggest(State(state): State<Orchestrator>, body: Result<Json<SuggestionRequest>, JsonRejection>) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return error_response(rejected(&rejection)),
    };

    match state.suggest(&request).await {
        Ok(ranked) => Json(ranked).into_response(),
        Err(e) => error_response(e),
    }
}

/// Handle `POST /suggest-feedback`
async fn suggest_feedback(
    State(state): State<Orchestrator>,
    body: Result<Json<SuggestionRecord>, JsonRejection>,
) -> Response {
    let record = match body {
        Ok(Json(record)) => record,
        Err(rejection) => return error_response(rejected(&rejection)),
    };

    match state.record_feedback(record).await {
        Ok(()) => (StatusCode::CREATED, Json(serde_json::json!({ "recorded": true }))).into_response(),
        Err(e) => error_response(e),
    }
}

fn rejected(rejection: &JsonRejection) -> LlmError {
    LlmError::Validation(rejection.body_text())
}

/// Convert an error into the JSON error envelope
#[allow(clippy::needless_pass_by_value)]
fn error_response(error: LlmError) -> Response {
    let status = error.status_code();
    let mut body = serde_json::json!({
        "error": {
            "message": error.client_message(),
            "type": error.error_type(),
        }
    });

    if let Some(request_id) = error.request_id() {
        body["error"]["requestId"] = request_id.into();
    }
    if !error.attempted().is_empty() {
        body["error"]["attemptedModels"] = error.attempted().into();
    }

    (status, Json(body)).into_response()
}
