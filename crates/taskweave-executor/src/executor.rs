use crate::batch::{BatchItem, BatchQueue};
use crate::circuit::{CircuitBreaker, CircuitState, Transition};
use crate::config::ExecutorConfig;
use crate::history::{HistoryEntry, TaskHistory};
use crate::providers::openai::OpenAiProvider;
use crate::providers::{Completion, CompletionProvider, CompletionRequest};
use crate::rate_limit::TokenBucket;
use crate::retry::{backoff_delay, is_non_retryable};
use crate::stream::{spawn_chunk_stream, StreamChunk, StreamRegistry};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskweave_core::{
    cancellation_pair, CancellationHandle, CancellationToken, EventSink, FlushTrigger,
    LifecycleEvent, Task, TaskweaveError, TaskweaveResult, Usage,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// Hours an entry stays in the task history before lazy pruning drops it.
const HISTORY_RETENTION_HOURS: i64 = 24;

/// The result of one resilient execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Generated text.
    pub text: String,
    /// Token usage of the successful call.
    pub usage: Usage,
    /// Whether the fallback provider produced the result.
    pub used_fallback: bool,
    /// Provider calls made, including the successful one.
    pub attempts: u32,
    /// Wall-clock duration of the execution.
    pub duration_ms: u64,
}

/// Capability match for a task against one executor.
#[derive(Debug, Clone)]
pub struct CapabilityScore {
    /// 1.0 for an exact type match, else weighted keyword score capped at 1.0.
    pub score: f64,
    /// Keywords from the lexicon found in the content.
    pub matched_keywords: Vec<String>,
}

/// State for one invocation; created at `execute` entry, dropped at exit.
struct ExecutionContext {
    started: Instant,
    cancel: CancellationToken,
}

/// Resilience wrapper around a single completion role.
///
/// Owns a circuit breaker, token bucket, retry engine, batch queue, and
/// stream registry — all private to this executor, so there is no
/// cross-executor contention. Admission order is fixed: shutdown gate,
/// then rate limit, then circuit breaker.
pub struct ResilientExecutor {
    config: ExecutorConfig,
    primary: Arc<dyn CompletionProvider>,
    fallback: Option<Arc<dyn CompletionProvider>>,
    circuit: Mutex<CircuitBreaker>,
    bucket: Mutex<TokenBucket>,
    history: Mutex<TaskHistory>,
    batch: BatchQueue,
    streams: StreamRegistry,
    in_flight: AtomicUsize,
    shutting_down: AtomicBool,
    events: EventSink,
}

impl ResilientExecutor {
    /// Build an executor whose providers come from the config.
    pub fn from_config(config: ExecutorConfig, events: EventSink) -> Self {
        let primary: Arc<dyn CompletionProvider> =
            Arc::new(OpenAiProvider::new(config.provider.clone()));
        let fallback = config
            .fallback_provider
            .clone()
            .map(|c| Arc::new(OpenAiProvider::new(c)) as Arc<dyn CompletionProvider>);
        Self::with_providers(config, primary, fallback, events)
    }

    /// Build an executor with injected providers (used by tests and
    /// custom backends).
    pub fn with_providers(
        config: ExecutorConfig,
        primary: Arc<dyn CompletionProvider>,
        fallback: Option<Arc<dyn CompletionProvider>>,
        events: EventSink,
    ) -> Self {
        Self {
            circuit: Mutex::new(CircuitBreaker::new(config.circuit.clone())),
            bucket: Mutex::new(TokenBucket::new(&config.rate_limit)),
            history: Mutex::new(TaskHistory::new(
                config.history_size,
                HISTORY_RETENTION_HOURS,
            )),
            batch: BatchQueue::default(),
            streams: Arc::new(Mutex::new(HashMap::new())),
            in_flight: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
            events,
            primary,
            fallback,
            config,
        }
    }

    /// Stable executor identifier.
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// The executor's configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Calls currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Current circuit state.
    pub fn circuit_state(&self) -> CircuitState {
        self.circuit.lock().state()
    }

    /// Consecutive failures recorded since the circuit last closed.
    pub fn circuit_failure_count(&self) -> u32 {
        self.circuit.lock().failure_count()
    }

    /// Manual circuit reset: force closed regardless of timers.
    pub fn reset_circuit(&self) {
        let transition = self.circuit.lock().reset();
        self.emit_transition(transition);
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Open chunk streams.
    pub fn active_streams(&self) -> usize {
        self.streams.lock().len()
    }

    /// Snapshot of the bounded task history.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().recent()
    }

    /// Score this executor's fit for a task.
    ///
    /// Exact type match wins outright; otherwise keywords found in the
    /// content contribute weights (longer keywords weigh more), capped
    /// at 1.0.
    pub fn capability(&self, task_type: &str, content: &str) -> CapabilityScore {
        if self
            .config
            .task_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(task_type))
        {
            return CapabilityScore {
                score: 1.0,
                matched_keywords: Vec::new(),
            };
        }
        let haystack = content.to_lowercase();
        let mut score = 0.0;
        let mut matched = Vec::new();
        for keyword in &self.config.keywords {
            if haystack.contains(&keyword.to_lowercase()) {
                score += keyword_weight(keyword);
                matched.push(keyword.clone());
            }
        }
        CapabilityScore {
            score: f64::min(score, 1.0),
            matched_keywords: matched,
        }
    }

    /// Execute one task through the full resilience policy.
    ///
    /// Admission order: shutdown gate, rate-limit token, circuit check.
    /// A rate-limit rejection does not touch circuit state.
    pub async fn execute(
        &self,
        task: &Task,
        cancel: CancellationToken,
    ) -> TaskweaveResult<ExecutionOutcome> {
        self.execute_inner(task, cancel, false).await
    }

    async fn execute_inner(
        &self,
        task: &Task,
        cancel: CancellationToken,
        bypass_shutdown_gate: bool,
    ) -> TaskweaveResult<ExecutionOutcome> {
        if !bypass_shutdown_gate && self.shutting_down.load(Ordering::SeqCst) {
            return Err(TaskweaveError::ShuttingDown(self.config.id.clone()));
        }
        if !self.bucket.lock().try_consume() {
            return Err(TaskweaveError::RateLimitExceeded(self.config.id.clone()));
        }
        {
            let (admitted, transition) = self.circuit.lock().try_acquire();
            self.emit_transition(transition);
            if !admitted {
                return Err(TaskweaveError::CircuitOpen(self.config.id.clone()));
            }
        }

        let mut ctx = ExecutionContext {
            started: Instant::now(),
            cancel,
        };

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = self.run_attempts(task, &mut ctx).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let duration_ms = ctx.started.elapsed().as_millis() as u64;
        match result {
            Ok((completion, used_fallback, attempts)) => {
                let transition = self.circuit.lock().record_success();
                self.emit_transition(transition);
                self.history.lock().record(HistoryEntry {
                    task_id: task.id,
                    success: true,
                    error: None,
                    duration_ms,
                    at: Utc::now(),
                });
                info!(
                    executor = %self.config.id,
                    task_id = %task.id,
                    attempts,
                    used_fallback,
                    duration_ms,
                    "execution complete"
                );
                Ok(ExecutionOutcome {
                    text: completion.text,
                    usage: completion.usage,
                    used_fallback,
                    attempts,
                    duration_ms,
                })
            }
            Err(e) => {
                // Cancellation is not a provider failure; everything else
                // counts toward the circuit.
                if !matches!(e, TaskweaveError::Cancelled) {
                    let transition = self.circuit.lock().record_failure();
                    self.emit_transition(transition);
                }
                self.history.lock().record(HistoryEntry {
                    task_id: task.id,
                    success: false,
                    error: Some(e.to_string()),
                    duration_ms,
                    at: Utc::now(),
                });
                warn!(
                    executor = %self.config.id,
                    task_id = %task.id,
                    error = %e,
                    "execution failed"
                );
                Err(e)
            }
        }
    }

    /// Retry loop over the primary provider, then one fallback attempt.
    async fn run_attempts(
        &self,
        task: &Task,
        ctx: &mut ExecutionContext,
    ) -> TaskweaveResult<(Completion, bool, u32)> {
        let retry = self.config.retry.clone();
        let mut last_err: Option<TaskweaveError> = None;

        for attempt in 0..=retry.max_attempts {
            match self.call_provider(self.primary.as_ref(), task, ctx).await {
                Ok(completion) => return Ok((completion, false, attempt + 1)),
                Err(TaskweaveError::Cancelled) => return Err(TaskweaveError::Cancelled),
                Err(e) if is_non_retryable(&e) => {
                    warn!(
                        executor = %self.config.id,
                        attempt,
                        error = %e,
                        "non-retryable error, aborting"
                    );
                    return Err(match e {
                        TaskweaveError::NonRetryable(msg) => TaskweaveError::NonRetryable(msg),
                        other => TaskweaveError::NonRetryable(other.to_string()),
                    });
                }
                Err(e) => {
                    if attempt < retry.max_attempts {
                        let delay = backoff_delay(&retry, attempt);
                        info!(
                            executor = %self.config.id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "retryable error, backing off"
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = ctx.cancel.cancelled() => return Err(TaskweaveError::Cancelled),
                        }
                    }
                    last_err = Some(e);
                }
            }
        }

        let primary_err = last_err
            .unwrap_or_else(|| TaskweaveError::Provider("primary provider exhausted".into()));

        if let Some(fallback) = &self.fallback {
            warn!(
                executor = %self.config.id,
                error = %primary_err,
                "primary exhausted, trying fallback provider"
            );
            return match self.call_provider(fallback.as_ref(), task, ctx).await {
                Ok(completion) => Ok((completion, true, retry.max_attempts + 2)),
                Err(TaskweaveError::Cancelled) => Err(TaskweaveError::Cancelled),
                Err(fb_err) => Err(TaskweaveError::Provider(format!(
                    "primary: {primary_err}; fallback: {fb_err}"
                ))),
            };
        }

        Err(TaskweaveError::Provider(primary_err.to_string()))
    }

    /// One provider call, raced against the time budget and cancellation.
    async fn call_provider(
        &self,
        provider: &dyn CompletionProvider,
        task: &Task,
        ctx: &mut ExecutionContext,
    ) -> TaskweaveResult<Completion> {
        let request = CompletionRequest {
            system_prompt: (!self.config.system_prompt.is_empty())
                .then(|| self.config.system_prompt.clone()),
            input: task.content.clone(),
            temperature: self.config.provider.temperature,
            max_tokens: self.config.provider.max_tokens,
        };
        let budget = Duration::from_millis(self.config.call_timeout_ms);
        tokio::select! {
            res = tokio::time::timeout(budget, provider.complete(&request)) => match res {
                Ok(inner) => inner,
                Err(_) => Err(TaskweaveError::Timeout(self.config.call_timeout_ms)),
            },
            _ = ctx.cancel.cancelled() => Err(TaskweaveError::Cancelled),
        }
    }

    /// Execute a task, then stream the result as paced chunks.
    ///
    /// The completion is obtained eagerly through the resilience policy;
    /// the returned stream is lazy, finite, and non-restartable. The
    /// final item carries the completion metadata.
    pub async fn execute_stream(
        &self,
        task: &Task,
        cancel: CancellationToken,
    ) -> TaskweaveResult<mpsc::Receiver<StreamChunk>> {
        let outcome = self.execute(task, cancel.clone()).await?;
        let (handle, registry_token) = cancellation_pair();
        self.streams.lock().insert(task.id, handle);
        self.events
            .emit(LifecycleEvent::StreamOpened { task_id: task.id });
        Ok(spawn_chunk_stream(
            task.id,
            outcome,
            self.config.stream.clone(),
            cancel,
            registry_token,
            Arc::clone(&self.streams),
            self.events.clone(),
        ))
    }

    /// Append a task to the batch queue.
    ///
    /// The queue flushes when it reaches `max_size` or when `max_wait_ms`
    /// has elapsed since the oldest unflushed item, whichever comes
    /// first. The returned receiver resolves independently of sibling
    /// items.
    pub fn enqueue_batch(
        self: &Arc<Self>,
        task: Task,
    ) -> TaskweaveResult<oneshot::Receiver<TaskweaveResult<ExecutionOutcome>>> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(TaskweaveError::ShuttingDown(self.config.id.clone()));
        }
        let (item, rx) = BatchItem::new(task);
        let len = self.batch.push(item);

        if len >= self.config.batch.max_size {
            let executor = Arc::clone(self);
            tokio::spawn(async move {
                executor.flush_batch(FlushTrigger::Size).await;
            });
        } else if len == 1 {
            // First item in an empty queue arms the max-wait timer.
            let executor = Arc::clone(self);
            let wait = Duration::from_millis(self.config.batch.max_wait_ms);
            tokio::spawn(async move {
                tokio::time::sleep(wait).await;
                executor.flush_batch(FlushTrigger::Timer).await;
            });
        }
        Ok(rx)
    }

    /// Drain and dispatch the batch queue in FIFO order, in
    /// concurrency-bounded chunks. One item's failure never fails its
    /// siblings.
    pub async fn flush_batch(&self, trigger: FlushTrigger) {
        let mut items = self.batch.drain_all();
        if items.is_empty() {
            return;
        }
        self.events.emit(LifecycleEvent::BatchFlushed {
            executor: self.config.id.clone(),
            size: items.len(),
            trigger,
        });
        info!(
            executor = %self.config.id,
            size = items.len(),
            ?trigger,
            "flushing batch"
        );
        let bypass = matches!(trigger, FlushTrigger::Shutdown);
        let concurrency = self.config.batch.chunk_concurrency.max(1);
        while !items.is_empty() {
            let take = concurrency.min(items.len());
            let chunk: Vec<BatchItem> = items.drain(..take).collect();
            futures_util::future::join_all(chunk.into_iter().map(|item| async move {
                let result = self
                    .execute_inner(&item.task, CancellationToken::noop(), bypass)
                    .await;
                let _ = item.respond.send(result);
            }))
            .await;
        }
    }

    /// Graceful shutdown: stop admitting, force-flush the batch queue,
    /// cancel open streams, then wait up to the configured grace period
    /// for in-flight calls before declaring shutdown complete.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        info!(executor = %self.config.id, "shutting down");

        self.flush_batch(FlushTrigger::Shutdown).await;

        let handles: Vec<CancellationHandle> = {
            let mut streams = self.streams.lock();
            streams.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &handles {
            handle.cancel();
        }

        let deadline = Instant::now() + Duration::from_millis(self.config.graceful_shutdown_ms);
        while self.in_flight.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let leftover = self.in_flight.load(Ordering::SeqCst);
        if leftover > 0 {
            warn!(
                executor = %self.config.id,
                in_flight = leftover,
                "graceful timeout elapsed, force-terminating"
            );
        }
    }

    fn emit_transition(&self, transition: Option<Transition>) {
        if let Some(t) = transition {
            info!(
                executor = %self.config.id,
                from = %t.from,
                to = %t.to,
                "circuit transition"
            );
            self.events.emit(LifecycleEvent::CircuitTransition {
                executor: self.config.id.clone(),
                from: t.from.to_string(),
                to: t.to.to_string(),
            });
        }
    }
}

/// Longer keywords are stronger signals.
fn keyword_weight(keyword: &str) -> f64 {
    match keyword.chars().count() {
        0..=4 => 0.1,
        5..=7 => 0.2,
        _ => 0.3,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
