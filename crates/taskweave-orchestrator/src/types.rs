use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use taskweave_core::{TaskPriority, TaskStatus, Usage};
use uuid::Uuid;

/// How the router arrived at its decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMethod {
    /// Declared task type matched a registered executor type.
    Type,
    /// Weighted keyword scoring cleared the match threshold.
    Keywords,
    /// Fell through to the least-loaded executor.
    Load,
    /// Fell through to the configured default executor.
    Default,
}

impl std::fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteMethod::Type => write!(f, "type"),
            RouteMethod::Keywords => write!(f, "keywords"),
            RouteMethod::Load => write!(f, "load"),
            RouteMethod::Default => write!(f, "default"),
        }
    }
}

/// The router's pick for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Selected executor.
    pub executor_id: String,
    /// Which resolution stage decided.
    pub method: RouteMethod,
    /// Confidence score for the pick.
    pub score: f64,
}

/// Per-candidate score computed during a route() call. Ephemeral.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingScore {
    /// Candidate executor.
    pub executor_id: String,
    /// Capability score against the task.
    pub score: f64,
    /// Lexicon keywords found in the content.
    pub matched_keywords: Vec<String>,
}

/// One decomposed unit of work inside a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    /// Subtask id, scoped to one pipeline run.
    pub id: Uuid,
    /// Executor this subtask is assigned to.
    pub target_executor: String,
    /// Role-scoped instructions for the target.
    pub instructions: String,
    /// Why the decomposer created this subtask.
    pub rationale: String,
    /// The undecomposed request, carried for context.
    pub original_request: String,
}

/// Result of one subtask's parallel execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskOutcome {
    /// The subtask this outcome belongs to.
    pub subtask_id: Uuid,
    /// Executor that handled (or was supposed to handle) it.
    pub executor: String,
    /// Output text on success.
    pub output: Option<String>,
    /// Failure message otherwise.
    pub error: Option<String>,
    /// True when the target executor was unknown and the subtask never ran.
    pub skipped: bool,
    /// Token usage of the subtask call.
    pub usage: Usage,
}

/// What happened in each pipeline phase. Partial subtask failure is
/// recorded here, never surfaced as an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseSummary {
    /// The decomposer was missing or unparseable and the fixed fallback ran.
    pub decompose_used_fallback: bool,
    /// Subtasks dispatched in the parallel phase.
    pub subtasks_total: usize,
    /// Subtasks that ran and failed.
    pub subtasks_failed: usize,
    /// Subtasks skipped because their target was unknown.
    pub subtasks_skipped: usize,
    /// The synthesizer was missing or failed and concatenation ran.
    pub synthesize_used_fallback: bool,
    /// The reviewer ran and its improvement was applied.
    pub quality_check_applied: bool,
}

/// Final output of a collaboration pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    /// The combined (and possibly reviewer-improved) result.
    pub result: String,
    /// Per-phase record of fallbacks and partial failures.
    pub phase_summary: PhaseSummary,
    /// Usage summed over every provider call the run made.
    pub aggregated_usage: Usage,
}

/// Whether a task runs on a single routed executor or through the
/// collaboration pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Router picks one executor.
    #[default]
    Direct,
    /// Decompose → parallel execute → synthesize → quality check.
    Collaborative,
}

/// Task submission contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Declared task type.
    pub task_type: String,
    /// Request content.
    pub content: String,
    /// Informational priority.
    #[serde(default)]
    pub priority: TaskPriority,
    /// Arbitrary metadata carried on the task record.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Direct or collaborative execution.
    #[serde(default)]
    pub mode: ExecutionMode,
}

impl SubmitRequest {
    /// A direct-mode request with default priority and no metadata.
    pub fn new(task_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            content: content.into(),
            priority: TaskPriority::default(),
            metadata: HashMap::new(),
            mode: ExecutionMode::Direct,
        }
    }

    /// Switch to collaborative execution.
    pub fn collaborative(mut self) -> Self {
        self.mode = ExecutionMode::Collaborative;
        self
    }
}

/// Admission response returned by `submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admission {
    /// Assigned task id.
    pub id: Uuid,
    /// Routed executor, or the pipeline marker in collaborative mode.
    pub assigned_executor: Option<String>,
    /// Always `Queued` on successful admission.
    pub status: TaskStatus,
}

/// Query response for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskView {
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Result text once completed.
    pub result: Option<String>,
    /// Failure message once failed.
    pub error: Option<String>,
    /// Aggregated usage so far.
    pub usage: Usage,
    /// Whether the result came from the dedupe cache.
    pub cache_hit: bool,
}

/// Aggregate counters kept per executor by the supervisor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorMetrics {
    /// Tasks completed successfully.
    pub completed: u64,
    /// Tasks that ended failed.
    pub failed: u64,
    /// Tokens spent across completed tasks.
    pub total_tokens: u64,
    /// Cumulative running-phase duration.
    pub total_duration_ms: u64,
}
