use crate::types::{RouteMethod, RoutingDecision, RoutingScore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use taskweave_core::{Task, TaskweaveError, TaskweaveResult};
use taskweave_executor::ResilientExecutor;
use tracing::debug;

/// Router settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Executor used when every other stage falls through.
    pub default_executor: String,
    /// Minimum keyword score for a keyword-stage pick.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
}

fn default_match_threshold() -> f64 {
    0.3
}

/// Content multipliers for the estimate-time helper.
const LONG_CONTENT_CHARS: usize = 500;
const VERY_LONG_CONTENT_CHARS: usize = 2_000;

/// Stateless scorer that picks an executor for a task.
///
/// Resolution order, first match wins: explicit type, weighted keywords
/// above the threshold, least in-flight load, configured default. The
/// decision is deterministic given fixed lexicons and loads; ties break
/// by registry order. Monotonic per-executor/method counters are kept
/// for observability.
pub struct Router {
    executors: Vec<Arc<ResilientExecutor>>,
    config: RouterConfig,
    counters: Mutex<HashMap<String, u64>>,
}

impl Router {
    /// Create a router over a closed registry of executors.
    pub fn new(executors: Vec<Arc<ResilientExecutor>>, config: RouterConfig) -> Self {
        Self {
            executors,
            config,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Pick an executor for a task.
    pub fn route(&self, task: &Task) -> TaskweaveResult<RoutingDecision> {
        if self.executors.is_empty() {
            return Err(TaskweaveError::Routing("no executors registered".into()));
        }

        // 1. Explicit type match.
        if let Some(exec) = self.executors.iter().find(|e| {
            e.config()
                .task_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&task.task_type))
        }) {
            return Ok(self.decide(exec.id(), RouteMethod::Type, 1.0));
        }

        // 2. Weighted keyword scoring; highest wins if it clears the bar.
        // Ties break by registry order.
        let scores = self.scores(task);
        let mut best: Option<&RoutingScore> = None;
        for candidate in &scores {
            if candidate.score >= self.config.match_threshold
                && best.map(|b| candidate.score > b.score).unwrap_or(true)
            {
                best = Some(candidate);
            }
        }
        if let Some(best) = best {
            return Ok(self.decide(&best.executor_id, RouteMethod::Keywords, best.score));
        }

        // 3. Load balancing: fewest in-flight tasks.
        if let Some(least_loaded) = self.executors.iter().min_by_key(|e| e.in_flight()) {
            let all_idle = self.executors.iter().all(|e| e.in_flight() == 0);
            if !all_idle {
                return Ok(self.decide(least_loaded.id(), RouteMethod::Load, 0.5));
            }
        }

        // 4. Default executor.
        let fallback = self
            .executors
            .iter()
            .find(|e| e.id() == self.config.default_executor)
            .or_else(|| self.executors.first())
            .ok_or_else(|| TaskweaveError::Routing("no executors registered".into()))?;
        Ok(self.decide(fallback.id(), RouteMethod::Default, 0.3))
    }

    /// Per-candidate capability scores for a task. Ephemeral, computed
    /// fresh on each call.
    pub fn scores(&self, task: &Task) -> Vec<RoutingScore> {
        self.executors
            .iter()
            .map(|e| {
                let capability = e.capability(&task.task_type, &task.content);
                RoutingScore {
                    executor_id: e.id().to_string(),
                    score: capability.score,
                    matched_keywords: capability.matched_keywords,
                }
            })
            .collect()
    }

    /// Rough duration estimate for UI display only — not a scheduling
    /// guarantee. Longer content scales the executor's base estimate.
    pub fn estimate_duration_ms(&self, executor_id: &str, content: &str) -> Option<u64> {
        let base = self
            .executors
            .iter()
            .find(|e| e.id() == executor_id)?
            .config()
            .estimated_duration_ms;
        let chars = content.chars().count();
        let scaled = if chars > VERY_LONG_CONTENT_CHARS {
            base as f64 * 1.6
        } else if chars > LONG_CONTENT_CHARS {
            base as f64 * 1.3
        } else {
            base as f64
        };
        Some(scaled.round() as u64)
    }

    /// Snapshot of the monotonic routing counters, keyed
    /// `executor/method`.
    pub fn counters(&self) -> HashMap<String, u64> {
        self.counters.lock().clone()
    }

    fn decide(&self, executor_id: &str, method: RouteMethod, score: f64) -> RoutingDecision {
        *self
            .counters
            .lock()
            .entry(format!("{executor_id}/{method}"))
            .or_insert(0) += 1;
        debug!(executor = executor_id, method = %method, score, "routed task");
        RoutingDecision {
            executor_id: executor_id.to_string(),
            method,
            score,
        }
    }
}
