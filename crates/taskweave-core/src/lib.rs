//! Core types and error definitions for the Taskweave execution core.
//!
//! This crate provides the foundational types shared across all Taskweave
//! crates: error handling, the task model, usage accounting, lifecycle
//! events, and cancellation.
//!
//! # Main types
//!
//! - [`TaskweaveError`] — Unified error enum for all subsystems.
//! - [`TaskweaveResult`] — Convenience alias for `Result<T, TaskweaveError>`.
//! - [`Task`] — A unit of requested work moving through the supervisor.
//! - [`Usage`] — Token accounting aggregated across provider calls.
//! - [`LifecycleEvent`] — Structured observability events.
//! - [`CancellationToken`] — Cooperative cancellation threaded through every
//!   suspension point.

/// Cancellation token and handle.
pub mod cancel;
/// Lifecycle event types and channel helpers.
pub mod events;

pub use cancel::{cancellation_pair, CancellationHandle, CancellationToken};
pub use events::{event_channel, EventSink, FlushTrigger, LifecycleEvent};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// --- Error types ---

/// Top-level error type for the Taskweave execution core.
///
/// Admission failures (`ShuttingDown`, `RateLimitExceeded`, `CircuitOpen`)
/// are distinct variants so operators can tell "wait and retry" apart from
/// genuine provider outages or credential problems.
#[derive(Debug, thiserror::Error)]
pub enum TaskweaveError {
    /// The executor is draining and no longer admits work.
    #[error("executor '{0}' is shutting down")]
    ShuttingDown(String),

    /// The executor's token bucket is empty.
    #[error("rate limit exceeded for executor '{0}'")]
    RateLimitExceeded(String),

    /// The executor's circuit breaker is open.
    #[error("circuit open for executor '{0}'")]
    CircuitOpen(String),

    /// Upstream provider failure after retries and fallback were exhausted.
    #[error("provider error: {0}")]
    Provider(String),

    /// Credential/permission/not-found failure; never retried.
    #[error("non-retryable provider error: {0}")]
    NonRetryable(String),

    /// The execution exceeded its time budget.
    #[error("execution timed out after {0} ms")]
    Timeout(u64),

    /// The execution was cancelled before completion.
    #[error("execution cancelled")]
    Cancelled,

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// No executor could be selected for a task.
    #[error("routing error: {0}")]
    Routing(String),

    /// Collaboration pipeline failure with every fallback unavailable.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Task supervisor admission or lifecycle error.
    #[error("supervisor error: {0}")]
    Supervisor(String),

    /// Persistence collaborator failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskweaveError {
    /// Whether this error was produced at admission, before any provider
    /// call was attempted.
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            TaskweaveError::ShuttingDown(_)
                | TaskweaveError::RateLimitExceeded(_)
                | TaskweaveError::CircuitOpen(_)
        )
    }
}

/// A convenience `Result` alias using [`TaskweaveError`].
pub type TaskweaveResult<T> = Result<T, TaskweaveError>;

// --- Task model ---

/// Lifecycle status of a [`Task`].
///
/// Transitions are monotonic along queued → running → terminal. The only
/// permitted sideways move is cancellation before a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Admitted, waiting in the FIFO queue.
    Queued,
    /// Currently executing.
    Running,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before reaching a terminal state.
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` respects the monotonic
    /// queued → running → terminal order (cancellation allowed pre-terminal).
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (TaskStatus::Queued, TaskStatus::Running) => true,
            (TaskStatus::Running, TaskStatus::Completed | TaskStatus::Failed) => true,
            (_, TaskStatus::Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Priority recorded on a task. Informational only — the supervisor queue
/// stays strictly FIFO.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Below-normal priority.
    Low,
    /// The default.
    #[default]
    Normal,
    /// Above-normal priority.
    High,
}

/// Token accounting for one or more provider calls.
///
/// Aggregated additively across retries, fallback attempts, and pipeline
/// phases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt side.
    pub prompt_tokens: u64,
    /// Tokens produced by the completion side.
    pub completion_tokens: u64,
    /// Total tokens billed.
    pub total_tokens: u64,
}

impl Usage {
    /// Add another usage record into this one.
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// A unit of requested work.
///
/// Created by the supervisor on admission, mutated by the executor or
/// pipeline, terminal at completed/failed/cancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier assigned on admission.
    pub id: Uuid,
    /// Declared task type, matched against executor capability types.
    pub task_type: String,
    /// The request content handed to the selected executor.
    pub content: String,
    /// Informational priority.
    #[serde(default)]
    pub priority: TaskPriority,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Executor chosen by the router, or the pipeline marker.
    pub assigned_executor: Option<String>,
    /// Final result text, present once completed.
    pub result: Option<String>,
    /// Short failure message, present once failed.
    pub error: Option<String>,
    /// Aggregated token usage for this task.
    #[serde(default)]
    pub usage: Usage,
    /// Whether the result was served from the dedupe cache.
    #[serde(default)]
    pub cache_hit: bool,
    /// Arbitrary key-value metadata attached at submission.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// UTC timestamp of admission.
    pub created_at: DateTime<Utc>,
    /// UTC timestamp of the queued → running transition.
    pub started_at: Option<DateTime<Utc>>,
    /// UTC timestamp of the terminal transition.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new queued task.
    pub fn new(task_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.into(),
            content: content.into(),
            priority: TaskPriority::Normal,
            status: TaskStatus::Queued,
            assigned_executor: None,
            result: None,
            error: None,
            usage: Usage::default(),
            cache_hit: false,
            metadata: HashMap::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}
