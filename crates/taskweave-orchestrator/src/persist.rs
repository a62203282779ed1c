use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use taskweave_core::{Task, TaskStatus, TaskweaveResult, Usage};
use tokio::sync::RwLock;
use uuid::Uuid;

/// One line of the cost ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    /// Task that incurred the spend.
    pub task_id: Uuid,
    /// Executor or pipeline that handled it.
    pub executor: String,
    /// Tokens spent.
    pub usage: Usage,
    /// When the spend was recorded.
    pub at: DateTime<Utc>,
}

/// Persistence collaborator for task records and the cost ledger.
///
/// The core tolerates idempotent re-writes: `update` with an unchanged
/// record must succeed, and `create` of an existing id overwrites.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Store a new task record.
    async fn create(&self, task: &Task) -> TaskweaveResult<()>;
    /// Fetch a task record by id.
    async fn get(&self, id: Uuid) -> TaskweaveResult<Option<Task>>;
    /// Overwrite an existing task record.
    async fn update(&self, task: &Task) -> TaskweaveResult<()>;
    /// List task records with the given status.
    async fn list_by_status(&self, status: TaskStatus) -> TaskweaveResult<Vec<Task>>;
    /// Append one entry to the cost ledger.
    async fn append_cost(&self, entry: &CostEntry) -> TaskweaveResult<()>;
}

/// In-memory persistence. Good enough for a single process; swap in a
/// real store behind the same trait for durability.
#[derive(Default)]
pub struct MemoryPersistence {
    tasks: RwLock<HashMap<Uuid, Task>>,
    ledger: RwLock<Vec<CostEntry>>,
}

impl MemoryPersistence {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the cost ledger.
    pub async fn ledger(&self) -> Vec<CostEntry> {
        self.ledger.read().await.clone()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn create(&self, task: &Task) -> TaskweaveResult<()> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> TaskweaveResult<Option<Task>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn update(&self, task: &Task) -> TaskweaveResult<()> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn list_by_status(&self, status: TaskStatus) -> TaskweaveResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut matching: Vec<Task> = tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|t| t.created_at);
        Ok(matching)
    }

    async fn append_cost(&self, entry: &CostEntry) -> TaskweaveResult<()> {
        self.ledger.write().await.push(entry.clone());
        Ok(())
    }
}
