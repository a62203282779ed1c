use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;
use taskweave_core::TaskweaveError;

/// Message patterns that mark a provider error as non-retryable.
///
/// Credential, permission, and not-found failures will not succeed on
/// retry and abort immediately without consuming retry budget.
const NON_RETRYABLE_PATTERNS: &[&str] = &[
    "invalid credentials",
    "invalid api key",
    "401",
    "unauthorized",
    "403",
    "forbidden",
    "404",
    "not found",
];

/// Whether an error belongs to the fixed non-retryable taxonomy.
pub fn is_non_retryable(err: &TaskweaveError) -> bool {
    if matches!(err, TaskweaveError::NonRetryable(_)) {
        return true;
    }
    let msg = err.to_string().to_lowercase();
    NON_RETRYABLE_PATTERNS.iter().any(|p| msg.contains(p))
}

/// Backoff delay for retry attempt `n`: `min(base · 2^n, max)` with
/// symmetric jitter of `± jitter_factor · delay`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let capped = config
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_delay_ms);
    let jitter = config.jitter_factor.clamp(0.0, 1.0);
    let factor = 1.0 + jitter * rand::thread_rng().gen_range(-1.0..=1.0);
    Duration::from_millis((capped as f64 * factor).round().max(0.0) as u64)
}
