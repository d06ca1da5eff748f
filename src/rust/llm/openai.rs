// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! OpenAI-compatible `/chat/completions` provider
//!
//! Works with OpenAI, Azure deployments (via `api-version`) and gateways
//! such as OpenRouter that speak the same protocol.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

use super::{CompletionProvider, CompletionRequest};
use crate::config::{LlmSettings, TokenParam};
use crate::error::{ConfigError, ProviderError};

pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    api_version: Option<String>,
}

impl OpenAiProvider {
    pub fn new(
        base_url: String,
        api_key: String,
        api_version: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_version,
        })
    }

    /// Endpoint from the settings or `OPENAI_BASE_URL`, key from `OPENAI_API_KEY`
    pub fn from_env(settings: &LlmSettings) -> Result<Self, ConfigError> {
        let base_url = match &settings.base_url {
            Some(url) => url.clone(),
            None => std::env::var(BASE_URL_ENV).map_err(|_| ConfigError::MissingEnv(BASE_URL_ENV))?,
        };
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| ConfigError::MissingEnv(API_KEY_ENV))?;
        Self::new(
            base_url,
            api_key,
            settings.api_version.clone(),
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// JSON body for a request, shaped by the model's capabilities
pub fn request_body(request: &CompletionRequest) -> Value {
    let model = &request.model;
    let mut body = Map::new();
    body.insert("model".into(), json!(model.id));
    body.insert("messages".into(), json!(request.wire_messages()));
    if model.supports_temperature {
        body.insert("temperature".into(), json!(request.params.temperature));
    }
    let token_field = match model.token_param {
        TokenParam::MaxTokens => "max_tokens",
        TokenParam::MaxCompletionTokens => "max_completion_tokens",
    };
    body.insert(token_field.into(), json!(request.params.max_tokens));
    if let Some(effort) = &model.reasoning_effort {
        body.insert("reasoning_effort".into(), json!(effort));
    }
    Value::Object(body)
}

/// Text of the first choice
pub fn parse_response(body: &str) -> Result<String, ProviderError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed("no choices in response".into()))?;
    match choice.message.content {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => Err(ProviderError::EmptyResponse),
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let mut builder = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request_body(request));
        if let Some(version) = &self.api_version {
            builder = builder.query(&[("api-version", version.as_str())]);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            debug!("{} returned {}: {}", self.endpoint(), status, body);
            return Err(ProviderError::from_status(status.as_u16(), body));
        }
        parse_response(&body)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelSpec;
    use crate::core::SamplingParams;
    use crate::llm::{ChatMessage, Role};

    fn request(model: ModelSpec) -> CompletionRequest {
        CompletionRequest {
            model,
            system: "sys".into(),
            messages: vec![ChatMessage::new(Role::User, "prove")],
            params: SamplingParams {
                temperature: 0.5,
                max_tokens: 1000,
            },
        }
    }

    #[test]
    fn test_chat_model_body() {
        let body = request_body(&request(ModelSpec::chat("gpt-4o", 128_000)));
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["max_tokens"], 1000);
        assert!(body.get("max_completion_tokens").is_none());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "prove");
    }

    #[test]
    fn test_reasoning_model_body() {
        let body = request_body(&request(ModelSpec::reasoning("o4-mini", "medium", 200_000)));
        assert!(body.get("temperature").is_none());
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["max_completion_tokens"], 1000);
        assert_eq!(body["reasoning_effort"], "medium");
    }

    #[test]
    fn test_parse_response() {
        let ok = r#"{"choices":[{"message":{"role":"assistant","content":"Proof. auto. Qed."}}]}"#;
        assert_eq!(parse_response(ok).unwrap(), "Proof. auto. Qed.");

        let empty = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        assert_eq!(parse_response(empty), Err(ProviderError::EmptyResponse));

        assert!(matches!(parse_response(r#"{"choices":[]}"#), Err(ProviderError::Malformed(_))));
        assert!(matches!(parse_response("<html>"), Err(ProviderError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_retryable() {
        let provider = OpenAiProvider::new(
            "http://127.0.0.1:1/v1/".into(),
            "key".into(),
            None,
            Duration::from_millis(500),
        )
        .unwrap();
        assert_eq!(provider.endpoint(), "http://127.0.0.1:1/v1/chat/completions");
        let err = provider
            .complete(&request(ModelSpec::chat("gpt-4o", 128_000)))
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err}");
    }
}
