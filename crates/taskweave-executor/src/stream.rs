use crate::config::StreamConfig;
use crate::executor::ExecutionOutcome;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use taskweave_core::{CancellationHandle, CancellationToken, EventSink, LifecycleEvent, Usage};
use tokio::sync::mpsc;
use uuid::Uuid;

/// One item of a chunked completion stream.
///
/// The stream is lazy, finite, and non-restartable: the completion is
/// obtained once, then sliced into paced chunks. The final item carries
/// the completion metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// A slice of the completion text.
    Delta {
        /// Zero-based chunk index.
        index: usize,
        /// The slice.
        text: String,
    },
    /// The stream finished; no further items follow.
    Done {
        /// Aggregated token usage for the underlying call.
        usage: Usage,
        /// Whether the fallback provider produced the text.
        used_fallback: bool,
        /// Number of delta chunks that were emitted.
        chunks: usize,
    },
}

/// Registry of open streams, keyed by task id. Shutdown cancels every
/// entry; a finished or cancelled stream removes its own entry.
pub(crate) type StreamRegistry = Arc<Mutex<HashMap<Uuid, CancellationHandle>>>;

/// Slice text into chunks of at most `size` characters, respecting UTF-8
/// boundaries.
fn chunk_text(text: &str, size: usize) -> Vec<String> {
    if size == 0 {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|c| c.iter().collect::<String>())
        .collect()
}

/// Spawn the pacing task for a chunk stream and return its receiver.
///
/// Cancellation (caller token or registry handle) halts emission within
/// one pacing interval and releases the registry entry.
pub(crate) fn spawn_chunk_stream(
    task_id: Uuid,
    outcome: ExecutionOutcome,
    config: StreamConfig,
    mut caller_cancel: CancellationToken,
    mut registry_cancel: CancellationToken,
    registry: StreamRegistry,
    events: EventSink,
) -> mpsc::Receiver<StreamChunk> {
    let (tx, rx) = mpsc::channel::<StreamChunk>(32);
    let interval = Duration::from_millis(config.flush_interval_ms);
    let chunks = chunk_text(&outcome.text, config.chunk_size);

    tokio::spawn(async move {
        let mut sent = 0usize;
        for (index, text) in chunks.into_iter().enumerate() {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = caller_cancel.cancelled() => {
                    registry.lock().remove(&task_id);
                    events.emit(LifecycleEvent::StreamCancelled { task_id });
                    return;
                }
                _ = registry_cancel.cancelled() => {
                    registry.lock().remove(&task_id);
                    events.emit(LifecycleEvent::StreamCancelled { task_id });
                    return;
                }
            }
            if tx.send(StreamChunk::Delta { index, text }).await.is_err() {
                // Receiver dropped; release state without a Done item.
                registry.lock().remove(&task_id);
                events.emit(LifecycleEvent::StreamCancelled { task_id });
                return;
            }
            sent += 1;
        }
        let _ = tx
            .send(StreamChunk::Done {
                usage: outcome.usage,
                used_fallback: outcome.used_fallback,
                chunks: sent,
            })
            .await;
        registry.lock().remove(&task_id);
        events.emit(LifecycleEvent::StreamCompleted {
            task_id,
            chunks: sent,
        });
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_text_even_split() {
        let chunks = chunk_text("abcdef", 2);
        assert_eq!(chunks, vec!["ab", "cd", "ef"]);
    }

    #[test]
    fn test_chunk_text_remainder() {
        let chunks = chunk_text("abcde", 2);
        assert_eq!(chunks, vec!["ab", "cd", "e"]);
    }

    #[test]
    fn test_chunk_text_multibyte_safe() {
        let chunks = chunk_text("héllo wörld", 3);
        assert_eq!(chunks.concat(), "héllo wörld");
    }

    #[test]
    fn test_chunk_text_empty() {
        assert!(chunk_text("", 4).is_empty());
    }
}
