use crate::types::{PhaseSummary, PipelineOutcome, Subtask, SubtaskOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taskweave_core::{CancellationToken, Task, TaskweaveError, TaskweaveResult, Usage};
use taskweave_executor::ResilientExecutor;
use tracing::{info, warn};
use uuid::Uuid;

/// Fixed fallback decomposition used when the decomposer is missing or
/// its output cannot be parsed, so the pipeline always has work.
const FALLBACK_ANGLES: [(&str, &str); 3] = [
    (
        "Gather the key facts and background needed to answer the request.",
        "fact gathering",
    ),
    (
        "Draft a clear, well-phrased response to the request.",
        "phrasing",
    ),
    (
        "Critically evaluate the request for risks, gaps, and counterpoints.",
        "critical evaluation",
    ),
];

/// Pipeline role assignments and decomposition bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Executor that splits the request into subtasks.
    #[serde(default)]
    pub decomposer: Option<String>,
    /// Executor that combines subtask outputs.
    #[serde(default)]
    pub synthesizer: Option<String>,
    /// Executor that may improve the synthesis.
    #[serde(default)]
    pub reviewer: Option<String>,
    /// Fewest subtasks an accepted decomposition may have.
    #[serde(default = "default_min_subtasks")]
    pub min_subtasks: usize,
    /// Most subtasks an accepted decomposition may have; excess is dropped.
    #[serde(default = "default_max_subtasks")]
    pub max_subtasks: usize,
}

fn default_min_subtasks() -> usize {
    2
}

fn default_max_subtasks() -> usize {
    6
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            decomposer: None,
            synthesizer: None,
            reviewer: None,
            min_subtasks: default_min_subtasks(),
            max_subtasks: default_max_subtasks(),
        }
    }
}

/// Shape of one element of the decomposer's JSON output.
#[derive(Debug, Deserialize)]
struct RawSubtask {
    #[serde(alias = "target_executor")]
    target: String,
    instructions: String,
    #[serde(default)]
    rationale: String,
}

/// Four-phase collaborative pipeline: decompose → parallel execute →
/// synthesize → quality check.
///
/// Every phase degrades gracefully; the run fails only when every
/// fallback path is simultaneously unavailable (all subtasks failed and
/// there is no synthesizer to salvage anything). Partial subtask failure
/// is recorded in the phase summary, never surfaced as an error.
pub struct CollaborationPipeline {
    executors: Vec<Arc<ResilientExecutor>>,
    config: PipelineConfig,
}

impl CollaborationPipeline {
    /// Create a pipeline over a closed registry of executors.
    pub fn new(executors: Vec<Arc<ResilientExecutor>>, config: PipelineConfig) -> Self {
        Self { executors, config }
    }

    fn find(&self, id: Option<&str>) -> Option<&Arc<ResilientExecutor>> {
        let id = id?;
        self.executors.iter().find(|e| e.id() == id)
    }

    /// Run the full pipeline for one task.
    pub async fn execute(&self, task: &Task) -> TaskweaveResult<PipelineOutcome> {
        let mut usage = Usage::default();
        let mut summary = PhaseSummary::default();

        info!(task_id = %task.id, "pipeline phase 1: decompose");
        let (subtasks, used_fallback) = self.decompose(task, &mut usage).await;
        summary.decompose_used_fallback = used_fallback;

        info!(
            task_id = %task.id,
            subtasks = subtasks.len(),
            "pipeline phase 2: parallel execute"
        );
        let outcomes = self.execute_parallel(task, &subtasks).await;
        summary.subtasks_total = outcomes.len();
        summary.subtasks_skipped = outcomes.iter().filter(|o| o.skipped).count();
        summary.subtasks_failed = outcomes
            .iter()
            .filter(|o| !o.skipped && o.error.is_some())
            .count();
        for outcome in &outcomes {
            usage.add(&outcome.usage);
        }

        info!(task_id = %task.id, "pipeline phase 3: synthesize");
        let (synthesis, used_fallback) = self.synthesize(task, &outcomes, &mut usage).await?;
        summary.synthesize_used_fallback = used_fallback;

        info!(task_id = %task.id, "pipeline phase 4: quality check");
        let (result, applied) = self.quality_check(task, synthesis, &mut usage).await;
        summary.quality_check_applied = applied;

        Ok(PipelineOutcome {
            result,
            phase_summary: summary,
            aggregated_usage: usage,
        })
    }

    /// Phase 1: split the request into subtasks via the decomposer, or
    /// fall back to the fixed generic decomposition.
    async fn decompose(&self, task: &Task, usage: &mut Usage) -> (Vec<Subtask>, bool) {
        if let Some(exec) = self.find(self.config.decomposer.as_deref()) {
            let prompt = self.decompose_prompt(task);
            let decompose_task = Task::new(task.task_type.clone(), prompt);
            match exec
                .execute(&decompose_task, CancellationToken::noop())
                .await
            {
                Ok(outcome) => {
                    usage.add(&outcome.usage);
                    if let Some(subtasks) = self.parse_subtasks(&outcome.text, task) {
                        return (subtasks, false);
                    }
                    warn!(
                        task_id = %task.id,
                        "decomposer output unparseable, using fallback subtasks"
                    );
                }
                Err(e) => {
                    warn!(
                        task_id = %task.id,
                        error = %e,
                        "decomposer failed, using fallback subtasks"
                    );
                }
            }
        }
        (self.fallback_subtasks(task), true)
    }

    fn decompose_prompt(&self, task: &Task) -> String {
        let roster = self
            .executors
            .iter()
            .map(|e| format!("- {}", e.id()))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Split the request below into {}-{} independent subtasks. \
             Respond with a JSON array only; each element must be an object \
             with \"target\" (one of the executors listed), \"instructions\", \
             and \"rationale\".\n\nExecutors:\n{}\n\nRequest: {}",
            self.config.min_subtasks, self.config.max_subtasks, roster, task.content
        )
    }

    /// Extract a JSON array of subtasks from the decomposer's reply.
    /// Returns `None` (triggering the fallback) when no parseable array
    /// with at least `min_subtasks` elements is found.
    fn parse_subtasks(&self, text: &str, task: &Task) -> Option<Vec<Subtask>> {
        let start = text.find('[')?;
        let end = text.rfind(']')?;
        if end <= start {
            return None;
        }
        let raw: Vec<RawSubtask> = serde_json::from_str(&text[start..=end]).ok()?;
        if raw.len() < self.config.min_subtasks {
            return None;
        }
        let mut subtasks: Vec<Subtask> = raw
            .into_iter()
            .map(|r| Subtask {
                id: Uuid::new_v4(),
                target_executor: r.target,
                instructions: r.instructions,
                rationale: r.rationale,
                original_request: task.content.clone(),
            })
            .collect();
        subtasks.truncate(self.config.max_subtasks);
        Some(subtasks)
    }

    fn fallback_subtasks(&self, task: &Task) -> Vec<Subtask> {
        FALLBACK_ANGLES
            .iter()
            .enumerate()
            .map(|(i, (instructions, rationale))| Subtask {
                id: Uuid::new_v4(),
                target_executor: self
                    .executors
                    .get(i % self.executors.len().max(1))
                    .map(|e| e.id().to_string())
                    .unwrap_or_default(),
                instructions: (*instructions).to_string(),
                rationale: (*rationale).to_string(),
                original_request: task.content.clone(),
            })
            .collect()
    }

    /// Phase 2: dispatch every subtask concurrently to its target. An
    /// unknown target becomes a skipped-error entry, never an abort.
    async fn execute_parallel(&self, task: &Task, subtasks: &[Subtask]) -> Vec<SubtaskOutcome> {
        futures_util::future::join_all(subtasks.iter().map(|subtask| async move {
            let Some(exec) = self.find(Some(&subtask.target_executor)) else {
                warn!(
                    task_id = %task.id,
                    target = %subtask.target_executor,
                    "unknown subtask target, skipping"
                );
                return SubtaskOutcome {
                    subtask_id: subtask.id,
                    executor: subtask.target_executor.clone(),
                    output: None,
                    error: Some(format!(
                        "unknown executor '{}'",
                        subtask.target_executor
                    )),
                    skipped: true,
                    usage: Usage::default(),
                };
            };
            let sub_task = Task::new(task.task_type.clone(), role_scoped(subtask));
            match exec.execute(&sub_task, CancellationToken::noop()).await {
                Ok(outcome) => SubtaskOutcome {
                    subtask_id: subtask.id,
                    executor: subtask.target_executor.clone(),
                    output: Some(outcome.text),
                    error: None,
                    skipped: false,
                    usage: outcome.usage,
                },
                Err(e) => SubtaskOutcome {
                    subtask_id: subtask.id,
                    executor: subtask.target_executor.clone(),
                    output: None,
                    error: Some(e.to_string()),
                    skipped: false,
                    usage: Usage::default(),
                },
            }
        }))
        .await
    }

    /// Phase 3: combine labeled subtask outputs (errors included) via the
    /// synthesizer, or fall back to concatenating the successful ones.
    async fn synthesize(
        &self,
        task: &Task,
        outcomes: &[SubtaskOutcome],
        usage: &mut Usage,
    ) -> TaskweaveResult<(String, bool)> {
        let labeled_all = outcomes
            .iter()
            .map(|o| match (&o.output, &o.error) {
                (Some(output), _) => format!("### {}\n{}", o.executor, output),
                (None, Some(error)) => format!("### {} (failed)\n{}", o.executor, error),
                (None, None) => format!("### {} (no output)", o.executor),
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        if let Some(exec) = self.find(self.config.synthesizer.as_deref()) {
            let prompt = format!(
                "Combine the labeled contributions below into one coherent \
                 response to the original request. Resolve overlaps and \
                 contradictions; treat failed contributions as missing.\n\n\
                 Original request: {}\n\nContributions:\n\n{}",
                task.content, labeled_all
            );
            let synth_task = Task::new(task.task_type.clone(), prompt);
            match exec.execute(&synth_task, CancellationToken::noop()).await {
                Ok(outcome) => {
                    usage.add(&outcome.usage);
                    return Ok((outcome.text, false));
                }
                Err(e) => {
                    warn!(
                        task_id = %task.id,
                        error = %e,
                        "synthesizer failed, falling back to concatenation"
                    );
                }
            }
        }

        let pieces: Vec<String> = outcomes
            .iter()
            .filter_map(|o| {
                o.output
                    .as_ref()
                    .map(|output| format!("### {}\n{}", o.executor, output))
            })
            .collect();
        if pieces.is_empty() {
            return Err(TaskweaveError::Pipeline(
                "every subtask failed and no synthesizer is available".into(),
            ));
        }
        Ok((pieces.join("\n\n"), true))
    }

    /// Phase 4: let the reviewer improve the synthesis; any failure
    /// degrades to the unmodified synthesis.
    async fn quality_check(
        &self,
        task: &Task,
        synthesis: String,
        usage: &mut Usage,
    ) -> (String, bool) {
        let Some(exec) = self.find(self.config.reviewer.as_deref()) else {
            return (synthesis, false);
        };
        let prompt = format!(
            "Review and improve the draft response below. Keep its meaning, \
             fix errors, tighten the wording. Return only the improved \
             response.\n\nOriginal request: {}\n\nDraft:\n{}",
            task.content, synthesis
        );
        let review_task = Task::new(task.task_type.clone(), prompt);
        match exec.execute(&review_task, CancellationToken::noop()).await {
            Ok(outcome) if !outcome.text.trim().is_empty() => {
                usage.add(&outcome.usage);
                (outcome.text, true)
            }
            Ok(_) => (synthesis, false),
            Err(e) => {
                warn!(
                    task_id = %task.id,
                    error = %e,
                    "reviewer failed, keeping unmodified synthesis"
                );
                (synthesis, false)
            }
        }
    }
}

/// Scope a subtask's instructions to its role, discouraging cross-subtask
/// contamination.
fn role_scoped(subtask: &Subtask) -> String {
    format!(
        "You are handling one part of a larger request. Respond only to \
         your instructions below and do not attempt the other parts.\n\n\
         Instructions: {}\n\nOriginal request, for context only: {}",
        subtask.instructions, subtask.original_request
    )
}

// ─── Tests ───────────────────────────────────────────────────────────────────
