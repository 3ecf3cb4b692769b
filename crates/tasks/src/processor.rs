//! Task processor: claim, categorize, format, emit, acknowledge.

use std::{sync::Arc, time::Duration};

use {
    chrono::Utc,
    taskbridge_config::ProcessorConfig,
    taskbridge_queue::{Task, TaskStatus, TaskStore},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    Result,
    category::categorize,
    format::render,
    outbox::{Outbox, OutboxEntry},
    responder::Responder,
};

/// Error recorded on tasks left in `processing` by a stopped process.
pub const INTERRUPTED: &str = "interrupted before processing finished";

pub struct Processor {
    store: Arc<dyn TaskStore>,
    outbox: Outbox,
    /// Sends acknowledgements. `None` completes tasks without replying.
    responder: Option<Responder>,
    config: ProcessorConfig,
}

impl Processor {
    pub fn new(
        store: Arc<dyn TaskStore>,
        outbox: Outbox,
        responder: Option<Responder>,
        config: ProcessorConfig,
    ) -> Self {
        let responder = responder.filter(|_| config.ack_replies);
        Self {
            store,
            outbox,
            responder,
            config,
        }
    }

    /// Claim and process the oldest pending task. `Ok(None)` when the queue
    /// has nothing pending.
    pub async fn process_next(&self) -> Result<Option<Task>> {
        let Some(task) = self.store.claim_next().await? else {
            return Ok(None);
        };
        self.process_claimed(task).await.map(Some)
    }

    /// Process until no pending task is left. Returns how many were handled,
    /// failed ones included.
    pub async fn drain(&self) -> Result<usize> {
        let mut handled = 0;
        let mut failed = 0;
        while let Some(task) = self.store.claim_next().await? {
            handled += 1;
            // Failures are already logged and recorded on the task.
            if self.process_claimed(task).await.is_err() {
                failed += 1;
            }
        }
        if handled > 0 {
            debug!(handled, failed, "processor pass finished");
        }
        Ok(handled)
    }

    /// Run a task already in `processing`. Any failure marks it failed with
    /// the error text and leaves the body for a manual requeue.
    pub async fn process_claimed(&self, task: Task) -> Result<Task> {
        let task_id = task.id;
        match self.handle(task).await {
            Ok(task) => {
                info!(
                    task_id,
                    category = ?task.category,
                    status = %task.status,
                    "task processed"
                );
                Ok(task)
            },
            Err(err) => {
                error!(task_id, error = %err, "task processing failed");
                self.mark_failed(task_id, &err.to_string()).await;
                Err(err)
            },
        }
    }

    async fn handle(&self, mut task: Task) -> Result<Task> {
        let category = categorize(&task.body);
        task.category = Some(category);
        debug!(task_id = task.id, %category, "categorized");

        let content = render(&self.config.task_template, &task);
        self.outbox
            .append(&OutboxEntry::new(&task, content))
            .await?;
        self.store.update(&task).await?;

        match self.responder {
            Some(ref responder) => {
                let ack = render(&self.config.ack_template, &task);
                responder.respond(task.id, &ack).await
            },
            None => {
                task.transition_to(TaskStatus::Completed, Utc::now())?;
                self.store.update(&task).await?;
                Ok(task)
            },
        }
    }

    /// Best effort: the responder may already have failed the task.
    async fn mark_failed(&self, task_id: u64, reason: &str) {
        let stored = match self.store.get(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(e) => {
                warn!(task_id, error = %e, "failed to reload task");
                return;
            },
        };
        if stored.status.is_terminal() {
            return;
        }
        let mut task = stored;
        if let Err(e) = task.fail(reason, Utc::now()) {
            warn!(task_id, error = %e, "failed to mark task failed");
            return;
        }
        if let Err(e) = self.store.update(&task).await {
            warn!(task_id, error = %e, "failed to persist task failure");
        }
    }

    /// Fail tasks a previous run claimed but never finished, so they can be
    /// requeued. Must run before this processor claims anything.
    pub async fn release_interrupted(&self) -> Result<usize> {
        let released = self.store.fail_interrupted(INTERRUPTED).await?;
        for task in &released {
            warn!(task_id = task.id, from = %task.source_id, "task was interrupted, marked failed");
        }
        Ok(released.len())
    }

    /// Release interrupted tasks, then poll for pending ones every `interval`
    /// until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let interval = self.config.interval().max(Duration::from_millis(100));
        if let Err(e) = self.release_interrupted().await {
            warn!(error = %e, "could not release interrupted tasks");
        }
        info!(interval_ms = interval.as_millis() as u64, "processor started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            if let Err(e) = self.drain().await {
                warn!(error = %e, "processor pass failed");
            }
            tokio::select! {
                () = tokio::time::sleep(interval) => {},
                () = cancel.cancelled() => break,
            }
        }
        info!("processor stopped");
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::responder::tests::{FakeSender, fast_policy},
        taskbridge_queue::{Category, InMemoryTaskStore, NewTask},
        taskbridge_whatsapp::Error as SendError,
        tempfile::TempDir,
    };

    struct Harness {
        processor: Processor,
        store: Arc<InMemoryTaskStore>,
        sender: Arc<FakeSender>,
        outbox: Outbox,
        _tmp: TempDir,
    }

    fn harness(sender: FakeSender, ack_replies: bool) -> Harness {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(InMemoryTaskStore::new());
        let sender = Arc::new(sender);
        let outbox = Outbox::in_dir(tmp.path());
        let responder = Responder::new(store.clone(), sender.clone(), fast_policy());
        let config = ProcessorConfig {
            ack_replies,
            ..Default::default()
        };
        Harness {
            processor: Processor::new(store.clone(), outbox.clone(), Some(responder), config),
            store,
            sender,
            outbox,
            _tmp: tmp,
        }
    }

    #[tokio::test]
    async fn processes_and_acknowledges() {
        let h = harness(FakeSender::default(), true);
        h.store
            .enqueue(NewTask::new("611111", "Build a script to rename files"))
            .await
            .unwrap();

        let task = h.processor.process_next().await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.category, Some(Category::Code));
        assert_eq!(task.response.as_deref(), Some("Task #1 received (code)."));

        let entries = h.outbox.read_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].content.starts_with("# Task 1 (code)"));
        assert_eq!(h.sender.attempts(), 1);
    }

    #[tokio::test]
    async fn completes_without_reply_when_acks_disabled() {
        let h = harness(FakeSender::default(), false);
        h.store
            .enqueue(NewTask::new("611111", "Idea: garden"))
            .await
            .unwrap();

        let task = h.processor.process_next().await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.category, Some(Category::Note));
        assert_eq!(task.response, None);
        assert_eq!(h.sender.attempts(), 0);
    }

    #[tokio::test]
    async fn empty_queue() {
        let h = harness(FakeSender::default(), true);
        assert!(h.processor.process_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reply_failure_marks_task_failed() {
        let h = harness(
            FakeSender::failing(vec![SendError::Rejected {
                status: 400,
                body: "bad recipient".into(),
            }]),
            true,
        );
        h.store
            .enqueue(NewTask::new("611111", "hello"))
            .await
            .unwrap();

        assert!(h.processor.process_next().await.is_err());
        let stored = h.store.get(1).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.category, Some(Category::General));
        assert_eq!(stored.body, "hello");
        assert!(stored.error.unwrap().contains("bad recipient"));
    }

    #[tokio::test]
    async fn outbox_failure_marks_task_failed() {
        let h = harness(FakeSender::default(), true);
        std::fs::create_dir(h.outbox.path()).unwrap();
        h.store
            .enqueue(NewTask::new("611111", "hello"))
            .await
            .unwrap();

        assert!(h.processor.process_next().await.is_err());
        let stored = h.store.get(1).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert!(stored.error.unwrap().contains("outbox"));
        assert_eq!(h.sender.attempts(), 0);
    }

    #[tokio::test]
    async fn drain_continues_past_failures() {
        let h = harness(
            FakeSender::failing(vec![SendError::Rejected {
                status: 400,
                body: "nope".into(),
            }]),
            true,
        );
        for body in ["first", "second", "third"] {
            h.store.enqueue(NewTask::new("611111", body)).await.unwrap();
        }

        assert_eq!(h.processor.drain().await.unwrap(), 3);
        let counts = h.store.counts().await.unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.completed, 2);
    }

    #[tokio::test]
    async fn run_releases_tasks_left_by_a_stopped_process() {
        let h = harness(FakeSender::default(), true);
        h.store
            .enqueue(NewTask::new("611111", "claimed before the crash"))
            .await
            .unwrap();
        h.store.claim_next().await.unwrap();
        h.store
            .enqueue(NewTask::new("611111", "still waiting"))
            .await
            .unwrap();

        // A plain drain cannot see the stuck task.
        assert_eq!(h.processor.drain().await.unwrap(), 1);
        assert_eq!(h.processor.release_interrupted().await.unwrap(), 1);

        let stuck = h.store.get(1).await.unwrap().unwrap();
        assert_eq!(stuck.status, TaskStatus::Failed);
        assert_eq!(stuck.error.as_deref(), Some(INTERRUPTED));
        assert_eq!(stuck.body, "claimed before the crash");
        assert_eq!(h.store.get(2).await.unwrap().unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let h = harness(FakeSender::default(), true);
        h.store
            .enqueue(NewTask::new("611111", "hello"))
            .await
            .unwrap();
        let processor = Arc::new(h.processor);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&processor).run(cancel.clone()));

        for _ in 0..100 {
            if h.store.counts().await.unwrap().completed == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(h.store.counts().await.unwrap().completed, 1);
    }
}
