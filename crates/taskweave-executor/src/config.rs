use serde::{Deserialize, Serialize};

/// Which completion provider API an executor talks to.
///
/// All variants are OpenAI-compatible chat-completions APIs; the variant
/// only selects the default base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// api.openai.com
    OpenAi,
    /// openrouter.ai
    OpenRouter,
    /// Groq cloud inference — OpenAI-compatible API, free tier with rate limits.
    Groq,
}

/// Connection settings for one completion provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider API family.
    pub provider: ProviderKind,
    /// Model identifier passed through to the API.
    pub model_id: String,
    /// Bearer token for the API.
    pub api_key: String,
    /// Base URL override; falls back to the provider's default.
    pub api_base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion token cap per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

impl ProviderConfig {
    /// Effective base URL for this provider.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url
        } else {
            match self.provider {
                ProviderKind::OpenAi => "https://api.openai.com",
                ProviderKind::OpenRouter => "https://openrouter.ai/api",
                ProviderKind::Groq => "https://api.groq.com/openai",
            }
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive failures in closed state before opening.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Milliseconds the circuit stays open after the last failure.
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
    /// Trial calls admitted while half-open.
    #[serde(default = "default_half_open_max_attempts")]
    pub half_open_max_attempts: u32,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_reset_timeout_ms() -> u64 {
    30_000
}

fn default_half_open_max_attempts() -> u32 {
    1
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
            half_open_max_attempts: default_half_open_max_attempts(),
        }
    }
}

/// Token bucket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Bucket capacity (burst size).
    #[serde(default = "default_bucket_max_tokens")]
    pub max_tokens: f64,
    /// Tokens added per second.
    #[serde(default = "default_refill_rate")]
    pub refill_rate: f64,
}

fn default_bucket_max_tokens() -> f64 {
    100.0
}

fn default_refill_rate() -> f64 {
    10.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_bucket_max_tokens(),
            refill_rate: default_refill_rate(),
        }
    }
}

/// Retry/backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap for the exponential backoff delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Fractional jitter applied symmetrically around the computed delay.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_attempts() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_factor() -> f64 {
    0.3
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

/// Chunked streaming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Characters per emitted chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Pacing interval between chunks, in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_chunk_size() -> usize {
    64
}

fn default_flush_interval_ms() -> u64 {
    50
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

/// Batch queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Queue length that triggers an immediate flush.
    #[serde(default = "default_batch_max_size")]
    pub max_size: usize,
    /// Milliseconds after the oldest unflushed item before a timer flush.
    #[serde(default = "default_batch_max_wait_ms")]
    pub max_wait_ms: u64,
    /// Items dispatched concurrently per flush chunk.
    #[serde(default = "default_chunk_concurrency")]
    pub chunk_concurrency: usize,
}

fn default_batch_max_size() -> usize {
    10
}

fn default_batch_max_wait_ms() -> u64 {
    250
}

fn default_chunk_concurrency() -> usize {
    3
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: default_batch_max_size(),
            max_wait_ms: default_batch_max_wait_ms(),
            chunk_concurrency: default_chunk_concurrency(),
        }
    }
}

/// Full configuration for one resilient executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Stable identifier used by the router and in error messages.
    pub id: String,
    /// Task types this executor matches exactly.
    #[serde(default)]
    pub task_types: Vec<String>,
    /// Capability lexicon for keyword scoring.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// System prompt prepended to every provider call.
    #[serde(default)]
    pub system_prompt: String,
    /// Primary completion provider.
    pub provider: ProviderConfig,
    /// Optional fallback provider tried once after the primary fails.
    #[serde(default)]
    pub fallback_provider: Option<ProviderConfig>,
    /// Circuit breaker thresholds.
    #[serde(default)]
    pub circuit: CircuitConfig,
    /// Token bucket settings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Retry/backoff settings.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Streaming settings.
    #[serde(default)]
    pub stream: StreamConfig,
    /// Batch queue settings.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Per-call time budget in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Milliseconds to wait for in-flight calls during shutdown.
    #[serde(default = "default_graceful_shutdown_ms")]
    pub graceful_shutdown_ms: u64,
    /// Task history ring buffer capacity.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Base duration estimate for routing display, in milliseconds.
    #[serde(default = "default_estimated_duration_ms")]
    pub estimated_duration_ms: u64,
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_graceful_shutdown_ms() -> u64 {
    5_000
}

fn default_history_size() -> usize {
    100
}

fn default_estimated_duration_ms() -> u64 {
    3_000
}
