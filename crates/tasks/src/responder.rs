//! Replies to the origin of a task.

use std::sync::Arc;

use {
    chrono::Utc,
    taskbridge_queue::{Task, TaskStatus, TaskStore},
    taskbridge_whatsapp::{MessageSender, RetryPolicy, SendReceipt, send_with_retry},
    tracing::{info, warn},
};

use crate::Result;

#[derive(Clone)]
pub struct Responder {
    store: Arc<dyn TaskStore>,
    sender: Arc<dyn MessageSender>,
    policy: RetryPolicy,
}

impl Responder {
    pub fn new(
        store: Arc<dyn TaskStore>,
        sender: Arc<dyn MessageSender>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            sender,
            policy,
        }
    }

    /// Send `text` to `source_id` with bounded retry. Not tied to a task.
    pub async fn send(&self, source_id: &str, text: &str) -> Result<SendReceipt> {
        Ok(send_with_retry(self.sender.as_ref(), source_id, text, self.policy).await?)
    }

    /// Reply to the sender of task `task_id`.
    ///
    /// On success the reply is stored as the task's response and a task that
    /// is still in flight is completed; a task that already completed just
    /// gets the response attached. Once retries are exhausted a task that is
    /// not yet terminal is marked failed and the send error is returned.
    pub async fn respond(&self, task_id: u64, text: &str) -> Result<Task> {
        let mut task = self
            .store
            .get(task_id)
            .await?
            .ok_or_else(|| taskbridge_queue::Error::task_not_found(task_id))?;

        if task.status == TaskStatus::Pending {
            task.transition_to(TaskStatus::Processing, Utc::now())?;
            self.store.update(&task).await?;
        }

        match self.send(&task.source_id, text).await {
            Ok(receipt) => {
                task.response = Some(text.to_string());
                if task.status == TaskStatus::Processing {
                    task.transition_to(TaskStatus::Completed, Utc::now())?;
                }
                self.store.update(&task).await?;
                info!(
                    task_id,
                    source_id = %task.source_id,
                    message_id = %receipt.message_id,
                    attempts = receipt.attempts,
                    "reply sent"
                );
                Ok(task)
            },
            Err(err) => {
                warn!(
                    task_id,
                    source_id = %task.source_id,
                    error = %err,
                    "reply failed"
                );
                if !task.status.is_terminal() {
                    task.fail(format!("reply failed: {err}"), Utc::now())?;
                    self.store.update(&task).await?;
                }
                Err(err)
            },
        }
    }
}
