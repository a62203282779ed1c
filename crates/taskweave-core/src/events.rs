use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// What triggered a batch flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushTrigger {
    /// The queue reached its size threshold.
    Size,
    /// The max-wait timer fired.
    Timer,
    /// A shutdown force-flushed the queue.
    Shutdown,
}

/// Structured lifecycle events emitted by the supervisor and executors.
///
/// Emission is lossy and never blocks execution: senders use `try_send` and
/// drop the event if the channel is full or closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A task moved from queued to running.
    TaskStarted {
        /// The task.
        task_id: Uuid,
        /// Executor or pipeline handling it.
        executor: String,
    },
    /// A task reached completed.
    TaskCompleted {
        /// The task.
        task_id: Uuid,
        /// Executor or pipeline that handled it.
        executor: String,
        /// Wall-clock duration of the running phase.
        duration_ms: u64,
        /// Whether the result came from the dedupe cache.
        cache_hit: bool,
    },
    /// A task reached failed.
    TaskFailed {
        /// The task.
        task_id: Uuid,
        /// Executor or pipeline that handled it.
        executor: String,
        /// Short failure message.
        error: String,
    },
    /// A task was cancelled pre-terminal.
    TaskCancelled {
        /// The task.
        task_id: Uuid,
    },
    /// An executor's circuit breaker changed state.
    CircuitTransition {
        /// The executor owning the circuit.
        executor: String,
        /// Previous state name.
        from: String,
        /// New state name.
        to: String,
    },
    /// An executor flushed its batch queue.
    BatchFlushed {
        /// The executor owning the queue.
        executor: String,
        /// Number of items dispatched.
        size: usize,
        /// What triggered the flush.
        trigger: FlushTrigger,
    },
    /// A chunk stream was opened for a task.
    StreamOpened {
        /// The task being streamed.
        task_id: Uuid,
    },
    /// A chunk stream was cancelled before completion.
    StreamCancelled {
        /// The task being streamed.
        task_id: Uuid,
    },
    /// A chunk stream emitted its final item.
    StreamCompleted {
        /// The task being streamed.
        task_id: Uuid,
        /// Number of delta chunks emitted.
        chunks: usize,
    },
}

/// Sender half of the lifecycle event channel.
pub type EventSender = mpsc::Sender<LifecycleEvent>;
/// Receiver half of the lifecycle event channel.
pub type EventReceiver = mpsc::Receiver<LifecycleEvent>;

/// Create a new lifecycle event channel.
pub fn event_channel(buffer: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(buffer)
}

/// Optional, non-blocking event emitter injected at construction.
///
/// A disconnected sink ([`EventSink::disabled`]) makes every emit a no-op,
/// so components never need to branch on observability being wired up.
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<EventSender>,
}

impl EventSink {
    /// Create a sink that forwards to the given sender.
    pub fn new(tx: EventSender) -> Self {
        Self { tx: Some(tx) }
    }

    /// Create a sink that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit an event. Never blocks; drops the event if the channel is full
    /// or closed.
    pub fn emit(&self, event: LifecycleEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }
}
