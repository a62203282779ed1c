//! Resilient executor for completion-provider calls.
//!
//! Wraps each provider call in the full resilience policy: circuit
//! breaking, token-bucket rate limiting, retries with jittered
//! exponential backoff, primary/fallback failover, chunked streaming,
//! and size/time-triggered batching. Circuit state, rate-limit bucket,
//! and batch queue are private per executor.
//!
//! # Main types
//!
//! - [`ResilientExecutor`] — The resilience wrapper around one role.
//! - [`CompletionProvider`] — Trait for external completion backends.
//! - [`ExecutorConfig`] — All resilience knobs, serde-loadable.
//! - [`StreamChunk`] — Items of a paced chunk stream.
//! - [`CircuitBreaker`] / [`TokenBucket`] — The underlying primitives.

/// Batch queue internals.
pub mod batch;
/// Circuit breaker state machine.
pub mod circuit;
/// Executor and provider configuration.
pub mod config;
/// The resilient executor itself.
pub mod executor;
/// Bounded task history ring buffer.
pub mod history;
/// Completion provider trait and backends.
pub mod providers;
/// Token bucket rate limiter.
pub mod rate_limit;
/// Retry classification and backoff math.
pub mod retry;
/// Chunked result streaming.
pub mod stream;

pub use batch::BatchItem;
pub use circuit::{CircuitBreaker, CircuitState, Transition};
pub use config::{
    BatchConfig, CircuitConfig, ExecutorConfig, ProviderConfig, ProviderKind, RateLimitConfig,
    RetryConfig, StreamConfig,
};
pub use executor::{CapabilityScore, ExecutionOutcome, ResilientExecutor};
pub use history::{HistoryEntry, TaskHistory};
pub use providers::openai::OpenAiProvider;
pub use providers::{Completion, CompletionProvider, CompletionRequest};
pub use rate_limit::TokenBucket;
pub use retry::{backoff_delay, is_non_retryable};
pub use stream::StreamChunk;
