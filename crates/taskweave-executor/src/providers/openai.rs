use super::{Completion, CompletionProvider, CompletionRequest};
use crate::config::{ProviderConfig, ProviderKind};
use async_trait::async_trait;
use taskweave_core::{TaskweaveError, TaskweaveResult, Usage};

/// OpenAI-compatible chat completions backend.
///
/// Works with OpenAI, OpenRouter, Groq, and any other provider exposing
/// the same API shape.
pub struct OpenAiProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl OpenAiProvider {
    /// Create a provider from connection settings.
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn build_messages(&self, request: &CompletionRequest) -> Vec<serde_json::Value> {
        let mut messages = Vec::new();
        if let Some(sys) = &request.system_prompt {
            if !sys.is_empty() {
                messages.push(serde_json::json!({
                    "role": "system",
                    "content": sys,
                }));
            }
        }
        messages.push(serde_json::json!({
            "role": "user",
            "content": request.input,
        }));
        messages
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");

        // OpenRouter requires attribution headers
        if matches!(self.config.provider, ProviderKind::OpenRouter) {
            request
                .header("HTTP-Referer", "https://github.com/taskweave/taskweave")
                .header("X-Title", "Taskweave")
        } else {
            request
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> TaskweaveResult<Completion> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());

        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": self.build_messages(request),
        });

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| TaskweaveError::Http(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TaskweaveError::Http(e.to_string()))?;

        if !status.is_success() {
            let message = format!("provider API error {status}: {resp_body}");
            // Credential/permission/not-found statuses are surfaced as
            // non-retryable so the retry engine aborts immediately.
            return Err(match status.as_u16() {
                401 | 403 | 404 => TaskweaveError::NonRetryable(message),
                _ => TaskweaveError::Http(message),
            });
        }

        parse_completion_response(&resp_body)
    }
}

/// Parse an OpenAI-style chat completions response body.
pub fn parse_completion_response(body: &serde_json::Value) -> TaskweaveResult<Completion> {
    let text = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| {
            TaskweaveError::Provider(format!("malformed completion response: {body}"))
        })?
        .to_string();

    let usage = Usage {
        prompt_tokens: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
        completion_tokens: body["usage"]["completion_tokens"].as_u64().unwrap_or(0),
        total_tokens: body["usage"]["total_tokens"].as_u64().unwrap_or(0),
    };

    Ok(Completion { text, usage })
}
