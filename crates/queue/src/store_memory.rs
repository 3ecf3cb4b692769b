//! In-memory task store for tests and ephemeral runs.

use {async_trait::async_trait, chrono::Utc, tokio::sync::Mutex};

use crate::{
    Result,
    state::QueueState,
    store::TaskStore,
    types::{Enqueued, NewTask, Task},
};

#[derive(Default)]
pub struct InMemoryTaskStore {
    state: Mutex<QueueState>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn enqueue(&self, task: NewTask) -> Result<Enqueued> {
        Ok(self.state.lock().await.enqueue(task, Utc::now()))
    }

    async fn enqueue_batch(&self, tasks: Vec<NewTask>, cursor: Option<i64>) -> Result<Vec<Task>> {
        Ok(self
            .state
            .lock()
            .await
            .enqueue_batch(tasks, cursor, Utc::now()))
    }

    async fn mark_seen(&self, provider_message_id: &str) -> Result<bool> {
        Ok(self.state.lock().await.mark_seen(provider_message_id))
    }

    async fn is_seen(&self, provider_message_id: &str) -> Result<bool> {
        Ok(self.state.lock().await.is_seen(provider_message_id))
    }

    async fn cursor(&self) -> Result<Option<i64>> {
        Ok(self.state.lock().await.ledger.cursor)
    }

    async fn get(&self, id: u64) -> Result<Option<Task>> {
        let state = self.state.lock().await;
        Ok(state.tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Task>> {
        Ok(self.state.lock().await.tasks.clone())
    }

    async fn claim_next(&self) -> Result<Option<Task>> {
        self.state.lock().await.claim_next(Utc::now())
    }

    async fn update(&self, task: &Task) -> Result<()> {
        self.state.lock().await.update(task)
    }

    async fn fail_interrupted(&self, reason: &str) -> Result<Vec<Task>> {
        self.state
            .lock()
            .await
            .fail_interrupted(reason, Utc::now())
    }

    async fn delete(&self, id: u64) -> Result<Task> {
        self.state.lock().await.delete(id)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::types::TaskStatus};

    #[tokio::test]
    async fn enqueue_then_list_by_status() {
        let store = InMemoryTaskStore::new();
        store.enqueue(NewTask::new("611111", "a")).await.unwrap();
        store.enqueue(NewTask::new("611111", "b")).await.unwrap();
        store.claim_next().await.unwrap();

        assert_eq!(
            store
                .list_by_status(TaskStatus::Pending)
                .await
                .unwrap()
                .len(),
            1
        );
        let counts = store.counts().await.unwrap();
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.pending, 1);
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let store = InMemoryTaskStore::new();
        assert!(store.get(42).await.unwrap().is_none());
    }
}
