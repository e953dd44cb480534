//! Local inference server provider (Ollama-style API)

use std::time::Duration;

use async_trait::async_trait;
use conduit_config::ProviderConfig;
use conduit_core::ProviderKind;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Provider, check_status, classify_transport};
use crate::error::ProviderError;
use crate::types::{Completion, GenerationParams, ModelDescriptor, Usage};

/// Provider speaking the local inference server protocol
pub struct LocalProvider {
    name: String,
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl LocalProvider {
    pub fn new(name: String, config: &ProviderConfig) -> Self {
        Self {
            name,
            client: Client::new(),
            base_url: config.base_url(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "GenerateOptions::is_empty")]
    options: GenerateOptions,
}

#[derive(Debug, Default, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
}

impl GenerateOptions {
    const fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.top_p.is_none()
            && self.num_predict.is_none()
            && self.frequency_penalty.is_none()
            && self.presence_penalty.is_none()
    }
}

impl From<&GenerationParams> for GenerateOptions {
    fn from(params: &GenerationParams) -> Self {
        Self {
            temperature: params.temperature,
            top_p: params.top_p,
            num_predict: params.max_tokens,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct TagList {
    models: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::LocalInference
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify_transport(&e, self.timeout))?;

        let tags: TagList = check_status(&self.name, response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse model list: {e}")))?;

        Ok(tags
            .models
            .into_iter()
            .map(|tag| ModelDescriptor { id: tag.name })
            .collect())
    }

    async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Completion, ProviderError> {
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: params.into(),
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::debug!(provider = %self.name, model, error = %e, "local inference request failed");
                classify_transport(&e, self.timeout)
            })?;

        let body: GenerateResponse = check_status(&self.name, response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse generation: {e}")))?;

        Ok(Completion {
            text: body.response,
            usage: Usage::new(body.prompt_eval_count, body.eval_count),
        })
    }
}
