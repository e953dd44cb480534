//! Request and response bodies of the orchestrator endpoints

use conduit_routing::{Model, StatusSummary};
use serde::{Deserialize, Serialize};

use crate::breaker::CircuitState;
use crate::types::{GenerationParams, Usage};

/// Body of `POST /process`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    /// Requested model, or `auto` to let the scoring engine choose
    pub model_id: String,
    #[serde(default)]
    pub fallback_models: Vec<String>,
    pub prompt: String,
    #[serde(flatten)]
    pub params: GenerationParams,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Content category used for auto routing, also accepted as `logType`
    #[serde(default, alias = "logType")]
    pub category: Option<String>,
}

/// Body returned by `POST /process`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessResponse {
    pub text: String,
    pub usage: Usage,
    #[serde(rename = "_meta")]
    pub meta: ResponseMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub request_id: String,
    /// Model that produced the response
    pub model_id: String,
    /// Primary model of the try-list
    pub original_model_id: String,
    pub fallback_used: bool,
    /// Milliseconds spent on the request
    pub processing_time: u64,
    pub attempted_models: Vec<String>,
}

/// Breaker state of one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerStatus {
    pub provider: String,
    pub state: CircuitState,
}

/// Body of `GET /models/status`
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub models: Vec<Model>,
    pub summary: StatusSummary,
    pub breakers: Vec<BreakerStatus>,
}
