use crate::executor::ExecutionOutcome;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Instant;
use taskweave_core::{Task, TaskweaveResult};
use tokio::sync::oneshot;
use uuid::Uuid;

/// A task waiting in the batch queue, with its response channel.
///
/// Each item resolves or rejects independently of its siblings.
pub struct BatchItem {
    /// Item id (distinct from the task id for dedupe-free tracking).
    pub id: Uuid,
    /// The queued task.
    pub task: Task,
    /// One-shot channel delivering this item's outcome.
    pub respond: oneshot::Sender<TaskweaveResult<ExecutionOutcome>>,
    /// When the item was enqueued; the flush timer keys off the oldest.
    pub enqueued_at: Instant,
}

impl BatchItem {
    /// Wrap a task with a fresh response channel; returns the receiver.
    pub fn new(task: Task) -> (Self, oneshot::Receiver<TaskweaveResult<ExecutionOutcome>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                id: Uuid::new_v4(),
                task,
                respond: tx,
                enqueued_at: Instant::now(),
            },
            rx,
        )
    }
}

/// FIFO batch queue, private to one executor.
///
/// Push/drain only; flush policy lives in the executor, which dispatches
/// drained items in concurrency-bounded chunks.
#[derive(Default)]
pub(crate) struct BatchQueue {
    items: Mutex<VecDeque<BatchItem>>,
}

impl BatchQueue {
    /// Append an item; returns the queue length after the push.
    pub fn push(&self, item: BatchItem) -> usize {
        let mut items = self.items.lock();
        items.push_back(item);
        items.len()
    }

    /// Take every queued item in FIFO order.
    pub fn drain_all(&self) -> Vec<BatchItem> {
        self.items.lock().drain(..).collect()
    }

    /// Current queue length.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}
