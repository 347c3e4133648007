//! OpenAI-compatible chat completions client.

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use crate::llm::routing::{self, MAX_RETRIES};
use crate::llm::{ChatTurn, CompletionProvider};

use anyhow::Context as _;
use async_trait::async_trait;

/// Talks to any `/v1/chat/completions` endpoint (Groq, OpenAI, OpenRouter,
/// local servers) and retries transient failures with exponential backoff.
pub struct LlmManager {
    config: LlmConfig,
    /// HTTP client for making requests.
    http_client: reqwest::Client,
}

impl std::fmt::Debug for LlmManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LlmManager {
    /// Create a new LLM manager with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .with_context(|| "failed to build HTTP client")?;

        if config.api_key.is_none() {
            tracing::warn!(base_url = %config.base_url, "no LLM API key configured");
        }

        Ok(Self {
            config,
            http_client,
        })
    }

    fn chat_completions_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn request_body(&self, system_prompt: &str, history: &[ChatTurn]) -> serde_json::Value {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(serde_json::json!({
            "role": "system",
            "content": system_prompt,
        }));
        messages.extend(history.iter().map(|turn| {
            serde_json::json!({
                "role": turn.role,
                "content": turn.content,
            })
        }));

        serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        })
    }

    /// Single request, no retry.
    async fn attempt_completion(&self, body: &serde_json::Value) -> std::result::Result<String, LlmError> {
        let url = self.chat_completions_url();
        let mut request_builder = self
            .http_client
            .post(&url)
            .header("content-type", "application/json");

        if let Some(api_key) = &self.config.api_key {
            request_builder = request_builder.header("authorization", format!("Bearer {api_key}"));
        }

        let response = request_builder
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::ProviderRequest(e.to_string()))?;

        let status = response.status();
        let response_text = response.text().await.map_err(|e| {
            LlmError::ProviderRequest(format!("failed to read response body: {e}"))
        })?;

        let response_body: serde_json::Value =
            serde_json::from_str(&response_text).map_err(|e| {
                LlmError::CompletionFailed(format!(
                    "response ({status}) is not valid JSON: {e}\nBody: {}",
                    truncate_body(&response_text)
                ))
            })?;

        if !status.is_success() {
            let message = response_body["error"]["message"]
                .as_str()
                .unwrap_or("unknown error");
            let error = format!("API error ({status}): {message}");
            return Err(if routing::is_retriable_status(status.as_u16()) {
                LlmError::ProviderRequest(error)
            } else {
                LlmError::CompletionFailed(error)
            });
        }

        parse_completion_text(&response_body)
    }
}

#[async_trait]
impl CompletionProvider for LlmManager {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
    ) -> std::result::Result<String, LlmError> {
        let body = self.request_body(system_prompt, history);

        let mut last_error = None;
        for attempt in 0..MAX_RETRIES {
            if let Some(delay) = routing::backoff_delay(attempt) {
                tracing::debug!(
                    model = %self.config.model,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt_completion(&body).await {
                Ok(text) => return Ok(text),
                Err(error) => {
                    if !routing::is_retriable_error(&error.to_string()) {
                        return Err(error);
                    }
                    tracing::warn!(
                        model = %self.config.model,
                        attempt = attempt + 1,
                        %error,
                        "retriable error"
                    );
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or(LlmError::EmptyResponse))
    }
}

/// Pull the assistant text out of a chat completions response.
fn parse_completion_text(body: &serde_json::Value) -> std::result::Result<String, LlmError> {
    let message = &body["choices"][0]["message"];

    // Some reasoning models put the answer in a separate field.
    let text = message["content"]
        .as_str()
        .filter(|text| !text.is_empty())
        .or_else(|| {
            message["reasoning_content"]
                .as_str()
                .filter(|text| !text.is_empty())
        });

    text.map(str::to_string).ok_or(LlmError::EmptyResponse)
}

fn truncate_body(body: &str) -> &str {
    let limit = 500;
    if body.len() <= limit {
        return body;
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
