use crate::cache::ResultCache;
use crate::persist::{CostEntry, Persistence};
use crate::pipeline::CollaborationPipeline;
use crate::router::Router;
use crate::types::{Admission, ExecutionMode, ExecutorMetrics, SubmitRequest, TaskView};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskweave_core::{
    cancellation_pair, CancellationHandle, EventSink, LifecycleEvent, Task, TaskStatus,
    TaskweaveError, TaskweaveResult, Usage,
};
use taskweave_executor::ResilientExecutor;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// Marker recorded as the assigned executor for collaborative tasks.
pub const PIPELINE_EXECUTOR: &str = "pipeline";

/// Supervisor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Seconds a dedupe cache entry stays valid.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Queue capacity; `submit` fails non-blockingly once full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_cache_ttl_secs() -> u64 {
    600
}

fn default_queue_capacity() -> usize {
    1_024
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

struct Tracked {
    task: Task,
    mode: ExecutionMode,
    cancel: CancellationHandle,
    notify: watch::Sender<TaskStatus>,
}

struct Inner {
    router: Router,
    pipeline: CollaborationPipeline,
    executors: Vec<Arc<ResilientExecutor>>,
    persistence: Arc<dyn Persistence>,
    cache: ResultCache,
    events: EventSink,
    tasks: RwLock<HashMap<Uuid, Tracked>>,
    metrics: RwLock<HashMap<String, ExecutorMetrics>>,
}

/// Owns the task lifecycle: admission, dedupe, and a single-concurrency
/// FIFO queue.
///
/// Status moves monotonically queued → running → terminal; cancellation
/// is honored only pre-terminal. Enqueue is non-blocking; completion is
/// observed by polling [`TaskSupervisor::status`] or subscribing via
/// [`TaskSupervisor::subscribe`].
pub struct TaskSupervisor {
    inner: Arc<Inner>,
    queue_tx: mpsc::Sender<Uuid>,
    worker: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TaskSupervisor {
    /// Create a supervisor and start its queue worker.
    pub fn new(
        executors: Vec<Arc<ResilientExecutor>>,
        router: Router,
        pipeline: CollaborationPipeline,
        persistence: Arc<dyn Persistence>,
        config: SupervisorConfig,
        events: EventSink,
    ) -> Self {
        let (queue_tx, mut queue_rx) = mpsc::channel::<Uuid>(config.queue_capacity.max(1));
        let inner = Arc::new(Inner {
            router,
            pipeline,
            executors,
            persistence,
            cache: ResultCache::new(Duration::from_secs(config.cache_ttl_secs)),
            events,
            tasks: RwLock::new(HashMap::new()),
            metrics: RwLock::new(HashMap::new()),
        });

        // Single-concurrency FIFO: exactly one task runs at a time.
        let worker_inner = Arc::clone(&inner);
        let worker = tokio::spawn(async move {
            while let Some(id) = queue_rx.recv().await {
                worker_inner.process(id).await;
            }
        });

        Self {
            inner,
            queue_tx,
            worker: parking_lot::Mutex::new(Some(worker)),
        }
    }

    /// Admit a task: route it (or mark it collaborative), persist the
    /// record, and enqueue. Never blocks on queue pressure.
    pub async fn submit(&self, request: SubmitRequest) -> TaskweaveResult<Admission> {
        let mut task = Task::new(request.task_type, request.content)
            .with_priority(request.priority)
            .with_metadata(request.metadata);

        match request.mode {
            ExecutionMode::Direct => {
                let decision = self.inner.router.route(&task)?;
                task.assigned_executor = Some(decision.executor_id);
            }
            ExecutionMode::Collaborative => {
                task.assigned_executor = Some(PIPELINE_EXECUTOR.to_string());
            }
        }

        self.inner.persistence.create(&task).await?;

        let (cancel, _token) = cancellation_pair();
        let (notify, _) = watch::channel(TaskStatus::Queued);
        let id = task.id;
        let admission = Admission {
            id,
            assigned_executor: task.assigned_executor.clone(),
            status: TaskStatus::Queued,
        };
        self.inner.tasks.write().await.insert(
            id,
            Tracked {
                task,
                mode: request.mode,
                cancel,
                notify,
            },
        );

        if self.queue_tx.try_send(id).is_err() {
            self.inner.tasks.write().await.remove(&id);
            return Err(TaskweaveError::Supervisor("task queue full".into()));
        }

        info!(
            task_id = %id,
            executor = admission.assigned_executor.as_deref().unwrap_or(""),
            "task admitted"
        );
        Ok(admission)
    }

    /// Request cancellation. Returns `false` once the task is terminal.
    ///
    /// A queued task is cancelled immediately; a running task's provider
    /// call is aborted through its cancellation token, and already-applied
    /// side effects are not rolled back.
    pub async fn cancel(&self, id: Uuid) -> bool {
        let cancelled_while_queued = {
            let mut tasks = self.inner.tasks.write().await;
            let Some(tracked) = tasks.get_mut(&id) else {
                return false;
            };
            if tracked.task.status.is_terminal() {
                return false;
            }
            tracked.cancel.cancel();
            if tracked.task.status == TaskStatus::Queued {
                tracked.task.status = TaskStatus::Cancelled;
                tracked.task.completed_at = Some(Utc::now());
                let _ = tracked.notify.send(TaskStatus::Cancelled);
                Some(tracked.task.clone())
            } else {
                None
            }
        };
        if let Some(task) = cancelled_while_queued {
            if let Err(e) = self.inner.persistence.update(&task).await {
                warn!(task_id = %id, error = %e, "persistence update failed");
            }
            self.inner
                .events
                .emit(LifecycleEvent::TaskCancelled { task_id: id });
            info!(task_id = %id, "task cancelled while queued");
        }
        true
    }

    /// Poll one task's state.
    pub async fn status(&self, id: Uuid) -> Option<TaskView> {
        let tasks = self.inner.tasks.read().await;
        tasks.get(&id).map(|t| TaskView {
            status: t.task.status,
            result: t.task.result.clone(),
            error: t.task.error.clone(),
            usage: t.task.usage,
            cache_hit: t.task.cache_hit,
        })
    }

    /// Subscribe to one task's status transitions.
    pub async fn subscribe(&self, id: Uuid) -> Option<watch::Receiver<TaskStatus>> {
        let tasks = self.inner.tasks.read().await;
        tasks.get(&id).map(|t| t.notify.subscribe())
    }

    /// Wait until a task reaches a terminal status.
    pub async fn wait_for_terminal(&self, id: Uuid) -> Option<TaskStatus> {
        let mut rx = self.subscribe(id).await?;
        loop {
            let status = *rx.borrow();
            if status.is_terminal() {
                return Some(status);
            }
            if rx.changed().await.is_err() {
                return Some(*rx.borrow());
            }
        }
    }

    /// Per-executor aggregate metrics snapshot.
    pub async fn metrics(&self) -> HashMap<String, ExecutorMetrics> {
        self.inner.metrics.read().await.clone()
    }

    /// The router, for estimate and counter queries.
    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Stop the queue worker and drain every executor. Queued tasks
    /// remain queued; there is no delivery guarantee across restarts.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
        for exec in &self.inner.executors {
            exec.shutdown().await;
        }
        info!("supervisor shut down");
    }
}

impl Inner {
    async fn process(&self, id: Uuid) {
        let (mut task, mode, cancel_token) = {
            let tasks = self.tasks.read().await;
            let Some(tracked) = tasks.get(&id) else {
                return;
            };
            // Cancelled while queued; nothing to do.
            if tracked.task.status != TaskStatus::Queued {
                return;
            }
            (tracked.task.clone(), tracked.mode, tracked.cancel.token())
        };

        let executor_label = task
            .assigned_executor
            .clone()
            .unwrap_or_else(|| "unassigned".to_string());

        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now());
        self.store(&task).await;
        self.events.emit(LifecycleEvent::TaskStarted {
            task_id: id,
            executor: executor_label.clone(),
        });
        info!(task_id = %id, executor = %executor_label, "task started");
        let started = Instant::now();

        // Dedupe: an identical task inside the TTL short-circuits
        // execution without a provider call.
        let key = ResultCache::key(&task.task_type, &executor_label, &task.content);
        if let Some(hit) = self.cache.get(&key) {
            task.result = Some(hit.result);
            task.usage = hit.usage;
            task.cache_hit = true;
            self.finish(task, TaskStatus::Completed, started, &executor_label)
                .await;
            return;
        }

        let result: TaskweaveResult<(String, Usage)> = match mode {
            ExecutionMode::Direct => {
                let assigned = self
                    .executors
                    .iter()
                    .find(|e| Some(e.id()) == task.assigned_executor.as_deref());
                match assigned {
                    Some(exec) => exec
                        .execute(&task, cancel_token)
                        .await
                        .map(|o| (o.text, o.usage)),
                    None => Err(TaskweaveError::Supervisor(format!(
                        "assigned executor '{executor_label}' not registered"
                    ))),
                }
            }
            ExecutionMode::Collaborative => {
                let mut token = cancel_token;
                tokio::select! {
                    r = self.pipeline.execute(&task) => r.map(|o| (o.result, o.aggregated_usage)),
                    _ = token.cancelled() => Err(TaskweaveError::Cancelled),
                }
            }
        };

        match result {
            Ok((text, usage)) => {
                self.cache.insert(key, text.clone(), usage);
                let cost = CostEntry {
                    task_id: id,
                    executor: executor_label.clone(),
                    usage,
                    at: Utc::now(),
                };
                if let Err(e) = self.persistence.append_cost(&cost).await {
                    warn!(task_id = %id, error = %e, "cost ledger append failed");
                }
                task.result = Some(text);
                task.usage = usage;
                self.finish(task, TaskStatus::Completed, started, &executor_label)
                    .await;
            }
            Err(TaskweaveError::Cancelled) => {
                self.finish(task, TaskStatus::Cancelled, started, &executor_label)
                    .await;
            }
            Err(e) => {
                task.error = Some(e.to_string());
                self.finish(task, TaskStatus::Failed, started, &executor_label)
                    .await;
            }
        }
    }

    async fn finish(
        &self,
        mut task: Task,
        status: TaskStatus,
        started: Instant,
        executor_label: &str,
    ) {
        task.status = status;
        task.completed_at = Some(Utc::now());
        let duration_ms = started.elapsed().as_millis() as u64;
        self.store(&task).await;

        {
            let mut metrics = self.metrics.write().await;
            let entry = metrics.entry(executor_label.to_string()).or_default();
            match status {
                TaskStatus::Completed => {
                    entry.completed += 1;
                    entry.total_tokens += task.usage.total_tokens;
                    entry.total_duration_ms += duration_ms;
                }
                TaskStatus::Failed => entry.failed += 1,
                _ => {}
            }
        }

        match status {
            TaskStatus::Completed => {
                self.events.emit(LifecycleEvent::TaskCompleted {
                    task_id: task.id,
                    executor: executor_label.to_string(),
                    duration_ms,
                    cache_hit: task.cache_hit,
                });
                info!(
                    task_id = %task.id,
                    executor = %executor_label,
                    duration_ms,
                    cache_hit = task.cache_hit,
                    "task completed"
                );
            }
            TaskStatus::Failed => {
                let error = task.error.clone().unwrap_or_default();
                self.events.emit(LifecycleEvent::TaskFailed {
                    task_id: task.id,
                    executor: executor_label.to_string(),
                    error: error.clone(),
                });
                warn!(task_id = %task.id, executor = %executor_label, error = %error, "task failed");
            }
            TaskStatus::Cancelled => {
                self.events
                    .emit(LifecycleEvent::TaskCancelled { task_id: task.id });
                info!(task_id = %task.id, "task cancelled");
            }
            _ => {}
        }
    }

    /// Write the task back to the tracked map, notify subscribers, and
    /// persist. Persistence failures are logged, never fatal.
    async fn store(&self, task: &Task) {
        {
            let mut tasks = self.tasks.write().await;
            if let Some(tracked) = tasks.get_mut(&task.id) {
                tracked.task = task.clone();
                let _ = tracked.notify.send(task.status);
            }
        }
        if let Err(e) = self.persistence.update(task).await {
            warn!(task_id = %task.id, error = %e, "persistence update failed");
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
