use crate::config::RateLimitConfig;
use std::time::Instant;

/// Token bucket rate limiter, private to one executor.
///
/// Refill is computed lazily from elapsed wall-clock time at each
/// consumption attempt and capped at capacity. Tokens never go negative.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64, // tokens per second
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            capacity: config.max_tokens,
            refill_rate: config.refill_rate,
            tokens: config.max_tokens,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Try to consume one token. Returns `false` when rate limited.
    pub fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently available, after a lazy refill.
    pub fn available(&mut self) -> f64 {
        self.refill();
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(max_tokens: f64, refill_rate: f64) -> RateLimitConfig {
        RateLimitConfig {
            max_tokens,
            refill_rate,
        }
    }

    #[test]
    fn test_allows_burst_up_to_capacity() {
        let mut bucket = TokenBucket::new(&config(5.0, 1.0));
        for _ in 0..5 {
            assert!(bucket.try_consume());
        }
        assert!(!bucket.try_consume());
    }

    #[test]
    fn test_blocks_when_empty() {
        let mut bucket = TokenBucket::new(&config(2.0, 0.1));
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
        // Never negative.
        assert!(bucket.available() >= 0.0);
    }

    #[test]
    fn test_refills_over_time() {
        let mut bucket = TokenBucket::new(&config(2.0, 50.0));
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
        std::thread::sleep(Duration::from_millis(40));
        assert!(bucket.try_consume());
    }

    #[test]
    fn test_refill_capped_at_capacity() {
        let mut bucket = TokenBucket::new(&config(3.0, 1000.0));
        std::thread::sleep(Duration::from_millis(20));
        assert!(bucket.available() <= 3.0);
    }
}
