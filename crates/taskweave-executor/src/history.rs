use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// One recorded execution outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The task that was executed.
    pub task_id: Uuid,
    /// Whether the call succeeded.
    pub success: bool,
    /// Short failure message when it didn't.
    pub error: Option<String>,
    /// Wall-clock duration of the call.
    pub duration_ms: u64,
    /// When the call finished.
    pub at: DateTime<Utc>,
}

/// Bounded ring buffer of recent executions, pruned lazily on access.
///
/// Entries older than the retention window are dropped whenever the buffer
/// is touched; no background task is involved.
#[derive(Debug)]
pub struct TaskHistory {
    entries: VecDeque<HistoryEntry>,
    max_entries: usize,
    retention: Duration,
}

impl TaskHistory {
    /// Create a history buffer with the given capacity and retention.
    pub fn new(max_entries: usize, retention_hours: i64) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries.min(64)),
            max_entries,
            retention: Duration::hours(retention_hours),
        }
    }

    fn prune(&mut self) {
        let cutoff = Utc::now() - self.retention;
        while self
            .entries
            .front()
            .map(|e| e.at < cutoff)
            .unwrap_or(false)
        {
            self.entries.pop_front();
        }
    }

    /// Append an entry, evicting the oldest once over capacity.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.prune();
        self.entries.push_back(entry);
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    /// Snapshot of retained entries, oldest first.
    pub fn recent(&mut self) -> Vec<HistoryEntry> {
        self.prune();
        self.entries.iter().cloned().collect()
    }

    /// Retained entry count.
    pub fn len(&mut self) -> usize {
        self.prune();
        self.entries.len()
    }

    /// Whether nothing is retained.
    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }
}
