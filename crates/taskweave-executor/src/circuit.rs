use crate::config::CircuitConfig;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests pass; failures are counted.
    Closed,
    /// Requests fail fast until the reset timeout elapses.
    Open,
    /// A bounded number of trial calls probe for recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// A state change, reported so callers can emit observability events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before.
    pub from: CircuitState,
    /// State after.
    pub to: CircuitState,
}

/// Failure-isolation state machine for one executor.
///
/// Owned privately per executor; all mutation happens through the owning
/// executor's lock. The failure count resets to zero only on a transition
/// into closed.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitConfig,
    state: CircuitState,
    failure_count: u32,
    half_open_attempts: u32,
    last_failure_at: Option<Instant>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            half_open_attempts: 0,
            last_failure_at: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Consecutive failure count since the last transition into closed.
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Admission check. Returns whether the call may proceed, plus any
    /// transition that happened (open → half_open when the reset timeout
    /// elapsed). A half-open admission consumes one trial permit.
    pub fn try_acquire(&mut self) -> (bool, Option<Transition>) {
        match self.state {
            CircuitState::Closed => (true, None),
            CircuitState::Open => {
                let elapsed = self
                    .last_failure_at
                    .map(|at| at.elapsed().as_millis() as u64 >= self.config.reset_timeout_ms)
                    .unwrap_or(true);
                if elapsed {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_attempts = 1;
                    (
                        true,
                        Some(Transition {
                            from: CircuitState::Open,
                            to: CircuitState::HalfOpen,
                        }),
                    )
                } else {
                    (false, None)
                }
            }
            CircuitState::HalfOpen => {
                if self.half_open_attempts < self.config.half_open_max_attempts {
                    self.half_open_attempts += 1;
                    (true, None)
                } else {
                    (false, None)
                }
            }
        }
    }

    /// Record a successful call. A half-open success closes the circuit,
    /// which is the only point where the failure count resets.
    pub fn record_success(&mut self) -> Option<Transition> {
        match self.state {
            CircuitState::HalfOpen => {
                self.state = CircuitState::Closed;
                self.failure_count = 0;
                self.half_open_attempts = 0;
                Some(Transition {
                    from: CircuitState::HalfOpen,
                    to: CircuitState::Closed,
                })
            }
            _ => None,
        }
    }

    /// Record a failed call.
    pub fn record_failure(&mut self) -> Option<Transition> {
        self.last_failure_at = Some(Instant::now());
        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= self.config.failure_threshold {
                    self.state = CircuitState::Open;
                    Some(Transition {
                        from: CircuitState::Closed,
                        to: CircuitState::Open,
                    })
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.half_open_attempts = 0;
                Some(Transition {
                    from: CircuitState::HalfOpen,
                    to: CircuitState::Open,
                })
            }
            CircuitState::Open => None,
        }
    }

    /// Manual reset: force closed regardless of timers.
    pub fn reset(&mut self) -> Option<Transition> {
        if self.state == CircuitState::Closed {
            self.failure_count = 0;
            return None;
        }
        let from = self.state;
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.half_open_attempts = 0;
        Some(Transition {
            from,
            to: CircuitState::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_config() -> CircuitConfig {
        CircuitConfig {
            failure_threshold: 3,
            reset_timeout_ms: 40,
            half_open_max_attempts: 1,
        }
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let mut cb = CircuitBreaker::new(fast_config());
        assert!(cb.record_failure().is_none());
        assert!(cb.record_failure().is_none());
        let transition = cb.record_failure();
        assert_eq!(
            transition,
            Some(Transition {
                from: CircuitState::Closed,
                to: CircuitState::Open,
            })
        );
        assert_eq!(cb.state(), CircuitState::Open);
        // Open circuit rejects until the reset timeout elapses.
        let (admitted, _) = cb.try_acquire();
        assert!(!admitted);
    }

    #[test]
    fn test_half_open_after_reset_timeout() {
        let mut cb = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        std::thread::sleep(Duration::from_millis(50));
        let (admitted, transition) = cb.try_acquire();
        assert!(admitted);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(
            transition,
            Some(Transition {
                from: CircuitState::Open,
                to: CircuitState::HalfOpen,
            })
        );
        // Only one trial permitted by default.
        let (second, _) = cb.try_acquire();
        assert!(!second);
    }

    #[test]
    fn test_half_open_success_closes_and_resets_count() {
        let mut cb = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        std::thread::sleep(Duration::from_millis(50));
        cb.try_acquire();
        let transition = cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert!(transition.is_some());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut cb = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        std::thread::sleep(Duration::from_millis(50));
        cb.try_acquire();
        let transition = cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(
            transition,
            Some(Transition {
                from: CircuitState::HalfOpen,
                to: CircuitState::Open,
            })
        );
        // Reset timer re-armed; still rejecting right away.
        let (admitted, _) = cb.try_acquire();
        assert!(!admitted);
    }

    #[test]
    fn test_success_in_closed_does_not_reset_count() {
        let mut cb = CircuitBreaker::new(fast_config());
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failure_count(), 2);
    }

    #[test]
    fn test_manual_reset_forces_closed() {
        let mut cb = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
        let transition = cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(transition.map(|t| t.to), Some(CircuitState::Closed));
        let (admitted, _) = cb.try_acquire();
        assert!(admitted);
    }
}
