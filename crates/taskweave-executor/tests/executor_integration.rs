//! Integration tests for the HTTP provider backend and the resilience
//! policy driving it, using a wiremock server in place of the real API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use taskweave_core::{CancellationToken, EventSink, Task, TaskweaveError};
use taskweave_executor::{
    CompletionProvider, CompletionRequest, ExecutorConfig, OpenAiProvider, ProviderConfig,
    ProviderKind, ResilientExecutor, RetryConfig,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_config(base_url: &str) -> ProviderConfig {
    ProviderConfig {
        provider: ProviderKind::OpenAi,
        model_id: "gpt-4o-mini".to_string(),
        api_key: "test-key".to_string(),
        api_base_url: Some(base_url.to_string()),
        temperature: 0.2,
        max_tokens: 128,
    }
}

fn executor_config(id: &str, base_url: &str) -> ExecutorConfig {
    ExecutorConfig {
        id: id.to_string(),
        task_types: vec![id.to_string()],
        keywords: Vec::new(),
        system_prompt: "You are a test executor.".to_string(),
        provider: provider_config(base_url),
        fallback_provider: None,
        circuit: Default::default(),
        rate_limit: Default::default(),
        retry: RetryConfig {
            max_attempts: 2,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_factor: 0.0,
        },
        stream: Default::default(),
        batch: Default::default(),
        call_timeout_ms: 5_000,
        graceful_shutdown_ms: 200,
        history_size: 100,
        estimated_duration_ms: 3_000,
    }
}

fn completion_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop",
        }],
        "usage": { "prompt_tokens": 9, "completion_tokens": 4, "total_tokens": 13 },
    })
}

#[tokio::test]
async fn provider_parses_success_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("mocked answer")))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(provider_config(&server.uri()));
    let completion = provider
        .complete(&CompletionRequest {
            system_prompt: Some("sys".to_string()),
            input: "hello".to_string(),
            temperature: 0.2,
            max_tokens: 128,
        })
        .await
        .unwrap();

    assert_eq!(completion.text, "mocked answer");
    assert_eq!(completion.usage.total_tokens, 13);
}

#[tokio::test]
async fn provider_maps_auth_failure_to_non_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(serde_json::json!({ "error": "invalid api key" })),
        )
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(provider_config(&server.uri()));
    let err = provider
        .complete(&CompletionRequest {
            system_prompt: None,
            input: "hello".to_string(),
            temperature: 0.2,
            max_tokens: 128,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TaskweaveError::NonRetryable(_)));
}

#[tokio::test]
async fn executor_retries_transient_failure_then_succeeds() {
    let server = MockServer::start().await;
    // First call fails with a 503; the retry hits the healthy mock below.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(serde_json::json!({ "error": "overloaded" })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("recovered")))
        .mount(&server)
        .await;

    let exec = ResilientExecutor::from_config(
        executor_config("research", &server.uri()),
        EventSink::disabled(),
    );
    let outcome = exec
        .execute(&Task::new("research", "ping"), CancellationToken::noop())
        .await
        .unwrap();

    assert_eq!(outcome.text, "recovered");
    assert_eq!(outcome.attempts, 2);
    assert!(!outcome.used_fallback);
}

#[tokio::test]
async fn executor_fails_over_to_fallback_provider() {
    let broken = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(serde_json::json!({ "error": "down" })),
        )
        .mount(&broken)
        .await;

    let healthy = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("from fallback")))
        .expect(1)
        .mount(&healthy)
        .await;

    let mut config = executor_config("research", &broken.uri());
    config.fallback_provider = Some(provider_config(&healthy.uri()));
    let exec = Arc::new(ResilientExecutor::from_config(config, EventSink::disabled()));

    let outcome = exec
        .execute(&Task::new("research", "ping"), CancellationToken::noop())
        .await
        .unwrap();

    assert_eq!(outcome.text, "from fallback");
    assert!(outcome.used_fallback);
}
