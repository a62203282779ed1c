//! Orchestration layer: content-based routing, the four-phase
//! collaboration pipeline, and the task supervisor.
//!
//! Implements the router → executor / pipeline → supervisor flow: the
//! supervisor admits a task, checks the dedupe cache, routes it to a
//! resilient executor (or the collaboration pipeline), then persists and
//! caches the result.
//!
//! # Main types
//!
//! - [`TaskSupervisor`] — Admission, dedupe, FIFO queue, lifecycle.
//! - [`Router`] — Stateless scorer picking an executor per task.
//! - [`CollaborationPipeline`] — Decompose → parallel execute →
//!   synthesize → quality check.
//! - [`ResultCache`] — TTL-bounded dedupe cache.
//! - [`Persistence`] — Task record and cost ledger collaborator.

/// Dedupe result cache.
pub mod cache;
/// Persistence trait and in-memory implementation.
pub mod persist;
/// Collaboration pipeline.
pub mod pipeline;
/// Content-based router.
pub mod router;
/// Task supervisor and queue.
pub mod supervisor;
/// Shared orchestration types.
pub mod types;

pub use cache::{CachedResult, ResultCache};
pub use persist::{CostEntry, MemoryPersistence, Persistence};
pub use pipeline::{CollaborationPipeline, PipelineConfig};
pub use router::{Router, RouterConfig};
pub use supervisor::{SupervisorConfig, TaskSupervisor, PIPELINE_EXECUTOR};
pub use types::{
    Admission, ExecutionMode, ExecutorMetrics, PhaseSummary, PipelineOutcome, RouteMethod,
    RoutingDecision, RoutingScore, SubmitRequest, Subtask, SubtaskOutcome, TaskView,
};
