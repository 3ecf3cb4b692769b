//! Persistence trait for the task queue.

use async_trait::async_trait;

use crate::{
    Result,
    types::{Enqueued, NewTask, StatusCounts, Task, TaskStatus},
};

/// Persistence backend for tasks and ingest bookkeeping.
///
/// Every method is one atomic read-modify-write: concurrent callers, in this
/// process or another, never lose each other's updates.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Append a pending task. Deduplicated by provider message ID.
    async fn enqueue(&self, task: NewTask) -> Result<Enqueued>;

    /// Append a batch and advance the poll cursor under one lock. The cursor
    /// is never persisted without the batch. The reverse can happen (the
    /// task file is written first), which is harmless: dedup also reads the
    /// task list, so a re-listed message is not queued twice.
    async fn enqueue_batch(&self, tasks: Vec<NewTask>, cursor: Option<i64>) -> Result<Vec<Task>>;

    /// Record a provider message ID that did not become a task (control
    /// commands). Returns `false` when it was already known.
    async fn mark_seen(&self, provider_message_id: &str) -> Result<bool>;

    async fn is_seen(&self, provider_message_id: &str) -> Result<bool>;

    /// Provider timestamp of the newest polled message.
    async fn cursor(&self) -> Result<Option<i64>>;

    async fn get(&self, id: u64) -> Result<Option<Task>>;

    /// All tasks in ID order.
    async fn list(&self) -> Result<Vec<Task>>;

    /// Move the oldest pending task to `processing` and return it.
    async fn claim_next(&self) -> Result<Option<Task>>;

    /// Replace a stored task. Backwards status moves are rejected.
    async fn update(&self, task: &Task) -> Result<()>;

    /// Move every `processing` task to `failed` with `reason`. Run at startup,
    /// before any processor claims work, to release tasks a stopped process
    /// left behind.
    async fn fail_interrupted(&self, reason: &str) -> Result<Vec<Task>>;

    /// Hard delete. Operator action only.
    async fn delete(&self, id: u64) -> Result<Task>;

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|t| t.status == status)
            .collect())
    }

    async fn counts(&self) -> Result<StatusCounts> {
        Ok(StatusCounts::from_tasks(&self.list().await?))
    }
}
