//! Mock provider backends for integration tests
//!
//! [`MockProvider::hosted`] speaks the OpenAI-compatible chat API and
//! [`MockProvider::local`] the local inference server API. Both return
//! canned answers and can be told to fail the next requests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// A mock provider listening on an ephemeral port
pub struct MockProvider {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
    prefix: &'static str,
}

struct MockState {
    models: Mutex<Vec<String>>,
    completion_count: AtomicU32,
    completions_by_model: Mutex<Vec<String>>,
    /// Requests left to fail before succeeding
    fail_count: AtomicU32,
    fail_status: AtomicU16,
    /// Listing requests answer 503 while set
    listing_down: AtomicBool,
    reply: String,
}

impl MockProvider {
    /// Start an OpenAI-compatible mock serving the given models
    pub async fn hosted(models: &[&str]) -> anyhow::Result<Self> {
        let state = MockState::new(models, "Hello from hosted mock");
        let app = Router::new()
            .route("/v1/models", routing::get(hosted_models))
            .route("/v1/chat/completions", routing::post(hosted_chat))
            .with_state(Arc::clone(&state));
        Self::serve(app, state, "/v1").await
    }

    /// Start a local-inference mock serving the given models
    pub async fn local(models: &[&str]) -> anyhow::Result<Self> {
        let state = MockState::new(models, "Hello from local mock");
        let app = Router::new()
            .route("/api/tags", routing::get(local_tags))
            .route("/api/generate", routing::post(local_generate))
            .with_state(Arc::clone(&state));
        Self::serve(app, state, "").await
    }

    async fn serve(app: Router, state: Arc<MockState>, prefix: &'static str) -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown,
            state,
            prefix,
        })
    }

    /// Base URL for configuring the mock as a provider
    pub fn base_url(&self) -> String {
        format!("http://{}{}", self.addr, self.prefix)
    }

    /// Fail the next `n` completion requests with `status`
    pub fn fail_next(&self, n: u32, status: u16) {
        self.state.fail_status.store(status, Ordering::Relaxed);
        self.state.fail_count.store(n, Ordering::Relaxed);
    }

    /// Make model listing requests fail
    pub fn take_listing_down(&self) {
        self.state.listing_down.store(true, Ordering::Relaxed);
    }

    /// Replace the advertised model list
    pub fn set_models(&self, models: &[&str]) {
        *self.state.models.lock().unwrap_or_else(PoisonError::into_inner) =
            models.iter().map(|m| (*m).to_owned()).collect();
    }

    /// Number of completion requests received
    pub fn completion_count(&self) -> u32 {
        self.state.completion_count.load(Ordering::Relaxed)
    }

    /// Number of completion requests received for one model
    pub fn completions_for(&self, model: &str) -> usize {
        self.state
            .completions_by_model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|m| *m == model)
            .count()
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl MockState {
    fn new(models: &[&str], reply: &str) -> Arc<Self> {
        Arc::new(Self {
            models: Mutex::new(models.iter().map(|m| (*m).to_owned()).collect()),
            completion_count: AtomicU32::new(0),
            completions_by_model: Mutex::new(Vec::new()),
            fail_count: AtomicU32::new(0),
            fail_status: AtomicU16::new(500),
            listing_down: AtomicBool::new(false),
            reply: reply.to_owned(),
        })
    }

    fn models(&self) -> Vec<String> {
        self.models.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Count the request and return a failure response if one is due
    fn record(&self, model: &str) -> Option<Response> {
        self.completion_count.fetch_add(1, Ordering::Relaxed);
        self.completions_by_model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(model.to_owned());

        let due = self
            .fail_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if !due {
            return None;
        }

        let status = StatusCode::from_u16(self.fail_status.load(Ordering::Relaxed))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Some(
            (
                status,
                Json(serde_json::json!({
                    "error": { "message": "mock provider intentional failure", "type": "server_error" }
                })),
            )
                .into_response(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct ModelRequest {
    model: String,
}

async fn hosted_models(State(state): State<Arc<MockState>>) -> Response {
    if state.listing_down.load(Ordering::Relaxed) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let data: Vec<_> = state
        .models()
        .into_iter()
        .map(|id| serde_json::json!({ "id": id, "object": "model", "owned_by": "mock" }))
        .collect();
    Json(serde_json::json!({ "object": "list", "data": data })).into_response()
}

async fn hosted_chat(State(state): State<Arc<MockState>>, Json(req): Json<ModelRequest>) -> Response {
    if let Some(failure) = state.record(&req.model) {
        return failure;
    }

    Json(serde_json::json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": req.model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": state.reply },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20 }
    }))
    .into_response()
}

async fn local_tags(State(state): State<Arc<MockState>>) -> Response {
    if state.listing_down.load(Ordering::Relaxed) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let models: Vec<_> = state
        .models()
        .into_iter()
        .map(|name| serde_json::json!({ "name": name, "size": 3_825_819_519_u64 }))
        .collect();
    Json(serde_json::json!({ "models": models })).into_response()
}

async fn local_generate(State(state): State<Arc<MockState>>, Json(req): Json<ModelRequest>) -> Response {
    if let Some(failure) = state.record(&req.model) {
        return failure;
    }

    Json(serde_json::json!({
        "model": req.model,
        "response": state.reply,
        "done": true,
        "prompt_eval_count": 26,
        "eval_count": 14
    }))
    .into_response()
}
