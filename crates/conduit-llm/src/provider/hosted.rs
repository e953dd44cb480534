//! Hosted OpenAI-compatible API provider

use std::time::Duration;

use async_trait::async_trait;
use conduit_config::ProviderConfig;
use conduit_core::ProviderKind;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{Provider, check_status, classify_transport};
use crate::error::ProviderError;
use crate::types::{Completion, GenerationParams, ModelDescriptor, Usage};

/// OpenAI-compatible provider
pub struct HostedProvider {
    name: String,
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl HostedProvider {
    pub fn new(name: String, config: &ProviderConfig) -> Self {
        Self {
            name,
            client: Client::new(),
            base_url: config.base_url(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
}

impl<'a> ChatRequest<'a> {
    const fn new(model: &'a str, prompt: &'a str, params: &GenerationParams) -> Self {
        Self {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ListedModel>,
}

#[derive(Debug, Deserialize)]
struct ListedModel {
    id: String,
}

impl TryFrom<ChatResponse> for Completion {
    type Error = ProviderError;

    fn try_from(response: ChatResponse) -> Result<Self, Self::Error> {
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("response has no message content".to_owned()))?;

        let usage = response
            .usage
            .map_or_else(Usage::default, |u| Usage::new(u.prompt_tokens, u.completion_tokens));

        Ok(Self { text, usage })
    }
}

#[async_trait]
impl Provider for HostedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::HostedApi
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ProviderError> {
        let builder = self
            .client
            .get(format!("{}/models", self.base_url))
            .timeout(self.timeout);

        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| classify_transport(&e, self.timeout))?;

        let list: ModelList = check_status(&self.name, response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse model list: {e}")))?;

        Ok(list
            .data
            .into_iter()
            .map(|m| ModelDescriptor { id: m.id })
            .collect())
    }

    async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Completion, ProviderError> {
        let builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(self.timeout)
            .json(&ChatRequest::new(model, prompt, params));

        let response = self.authorize(builder).send().await.map_err(|e| {
            tracing::debug!(provider = %self.name, model, error = %e, "hosted api request failed");
            classify_transport(&e, self.timeout)
        })?;

        let body: ChatResponse = check_status(&self.name, response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse completion: {e}")))?;

        body.try_into()
    }
}
