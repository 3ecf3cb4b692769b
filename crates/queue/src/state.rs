//! Queue mutations shared by every store backend.
//!
//! A backend loads a [`QueueState`], applies one of these operations while
//! holding its lock, and persists the result.

use chrono::{DateTime, Utc};

use crate::{
    Error, Result,
    ledger::IngestLedger,
    types::{Enqueued, NewTask, Task, TaskStatus},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueState {
    pub tasks: Vec<Task>,
    pub ledger: IngestLedger,
}

impl QueueState {
    /// Whether a provider message ID was already ingested. The task list is
    /// consulted too, so a crash between the task write and the ledger write
    /// still deduplicates.
    #[must_use]
    pub fn is_seen(&self, provider_message_id: &str) -> bool {
        self.ledger.seen.contains(provider_message_id)
            || self
                .tasks
                .iter()
                .any(|t| t.provider_message_id.as_deref() == Some(provider_message_id))
    }

    fn allocate_id(&mut self) -> u64 {
        let max_existing = self.tasks.iter().map(|t| t.id).max().unwrap_or(0);
        let id = self.ledger.next_task_id.max(max_existing + 1).max(1);
        self.ledger.next_task_id = id + 1;
        id
    }

    pub fn enqueue(&mut self, new: NewTask, now: DateTime<Utc>) -> Enqueued {
        if let Some(ref mid) = new.provider_message_id {
            if self.is_seen(mid) {
                return Enqueued::Duplicate {
                    provider_message_id: mid.clone(),
                };
            }
            self.ledger.seen.insert(mid.clone());
        }

        let task = Task {
            id: self.allocate_id(),
            source_id: new.source_id,
            provider_message_id: new.provider_message_id,
            body: new.body,
            category: None,
            status: TaskStatus::Pending,
            created_at: now,
            processed_at: None,
            response: None,
            error: None,
        };
        self.tasks.push(task.clone());
        Enqueued::Created(task)
    }

    /// Enqueue a batch and advance the cursor in the same mutation.
    pub fn enqueue_batch(
        &mut self,
        batch: Vec<NewTask>,
        cursor: Option<i64>,
        now: DateTime<Utc>,
    ) -> Vec<Task> {
        let created = batch
            .into_iter()
            .filter_map(|new| match self.enqueue(new, now) {
                Enqueued::Created(task) => Some(task),
                Enqueued::Duplicate { .. } => None,
            })
            .collect();
        if let Some(cursor) = cursor {
            self.ledger.advance_cursor(cursor);
        }
        created
    }

    /// Record a provider message ID without creating a task. Returns `false`
    /// when it was already known.
    pub fn mark_seen(&mut self, provider_message_id: &str) -> bool {
        if self.is_seen(provider_message_id) {
            return false;
        }
        self.ledger.seen.insert(provider_message_id.to_string())
    }

    /// Claim the oldest pending task, moving it to `processing`.
    pub fn claim_next(&mut self, now: DateTime<Utc>) -> Result<Option<Task>> {
        let Some(task) = self
            .tasks
            .iter_mut()
            .filter(|t| t.status == TaskStatus::Pending)
            .min_by_key(|t| t.id)
        else {
            return Ok(None);
        };
        task.transition_to(TaskStatus::Processing, now)?;
        Ok(Some(task.clone()))
    }

    /// Fail every task left in `processing` by a process that stopped before
    /// finishing it. Only safe while no processor is running.
    pub fn fail_interrupted(&mut self, reason: &str, now: DateTime<Utc>) -> Result<Vec<Task>> {
        let mut failed = Vec::new();
        for task in self
            .tasks
            .iter_mut()
            .filter(|t| t.status == TaskStatus::Processing)
        {
            task.fail(reason, now)?;
            failed.push(task.clone());
        }
        Ok(failed)
    }

    /// Write a caller's copy of a task back, refusing backwards status moves
    /// and changes to identity fields.
    ///
    /// Attached fields (category, response, error, processed time) are never
    /// cleared: a stale copy that lacks one keeps the stored value.
    pub fn update(&mut self, updated: &Task) -> Result<()> {
        let stored = self
            .tasks
            .iter_mut()
            .find(|t| t.id == updated.id)
            .ok_or_else(|| Error::task_not_found(updated.id))?;

        if !stored.status.can_transition_to(updated.status) {
            return Err(Error::InvalidTransition {
                id: stored.id,
                from: stored.status,
                to: updated.status,
            });
        }
        if stored.source_id != updated.source_id
            || stored.created_at != updated.created_at
            || stored.provider_message_id != updated.provider_message_id
        {
            return Err(Error::message(format!(
                "task {}: source, creation time and message ID are immutable",
                stored.id
            )));
        }

        stored.status = updated.status;
        stored.body.clone_from(&updated.body);
        stored.category = updated.category.or(stored.category);
        stored.processed_at = updated.processed_at.or(stored.processed_at);
        if updated.response.is_some() {
            stored.response.clone_from(&updated.response);
        }
        if updated.error.is_some() {
            stored.error.clone_from(&updated.error);
        }
        Ok(())
    }

    pub fn delete(&mut self, id: u64) -> Result<Task> {
        let pos = self
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| Error::task_not_found(id))?;
        Ok(self.tasks.remove(pos))
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let mut state = QueueState::default();
        let now = Utc::now();
        let a = state.enqueue(NewTask::new("1", "a"), now);
        let b = state.enqueue(NewTask::new("1", "b"), now);
        assert_eq!(a.task().unwrap().id, 1);
        assert_eq!(b.task().unwrap().id, 2);

        state.delete(2).unwrap();
        let c = state.enqueue(NewTask::new("1", "c"), now);
        assert_eq!(c.task().unwrap().id, 3);
    }

    #[test]
    fn id_allocation_survives_stale_ledger() {
        // Tasks written, ledger write lost: the next ID still skips ahead.
        let mut state = QueueState::default();
        let now = Utc::now();
        state.enqueue(NewTask::new("1", "a"), now);
        state.enqueue(NewTask::new("1", "b"), now);
        state.ledger = IngestLedger::default();
        let next = state.enqueue(NewTask::new("1", "c"), now);
        assert_eq!(next.task().unwrap().id, 3);
    }

    #[test]
    fn duplicate_message_id_is_rejected() {
        let mut state = QueueState::default();
        let now = Utc::now();
        let first = state.enqueue(NewTask::new("1", "a").with_message_id("wamid.1"), now);
        let second = state.enqueue(NewTask::new("1", "a").with_message_id("wamid.1"), now);
        assert!(matches!(first, Enqueued::Created(_)));
        assert_eq!(
            second,
            Enqueued::Duplicate {
                provider_message_id: "wamid.1".into()
            }
        );
        assert_eq!(state.tasks.len(), 1);
    }

    #[test]
    fn dedup_falls_back_to_task_list() {
        let mut state = QueueState::default();
        let now = Utc::now();
        state.enqueue(NewTask::new("1", "a").with_message_id("wamid.1"), now);
        state.ledger.seen.clear();
        assert!(state.is_seen("wamid.1"));
    }

    #[test]
    fn batch_dedups_within_itself_and_advances_cursor() {
        let mut state = QueueState::default();
        let created = state.enqueue_batch(
            vec![
                NewTask::new("1", "a").with_message_id("m1"),
                NewTask::new("1", "a again").with_message_id("m1"),
                NewTask::new("1", "b").with_message_id("m2"),
            ],
            Some(1_700_000_000),
            Utc::now(),
        );
        assert_eq!(created.len(), 2);
        assert_eq!(state.ledger.cursor, Some(1_700_000_000));
    }

    #[test]
    fn claim_takes_oldest_pending() {
        let mut state = QueueState::default();
        let now = Utc::now();
        state.enqueue(NewTask::new("1", "first"), now);
        state.enqueue(NewTask::new("1", "second"), now);

        let claimed = state.claim_next(now).unwrap().unwrap();
        assert_eq!(claimed.body, "first");
        assert_eq!(claimed.status, TaskStatus::Processing);

        let next = state.claim_next(now).unwrap().unwrap();
        assert_eq!(next.body, "second");
        assert!(state.claim_next(now).unwrap().is_none());
    }

    #[test]
    fn update_refuses_regression() {
        let mut state = QueueState::default();
        let now = Utc::now();
        state.enqueue(NewTask::new("1", "a"), now);
        let mut task = state.claim_next(now).unwrap().unwrap();
        task.transition_to(TaskStatus::Completed, now).unwrap();
        state.update(&task).unwrap();

        let mut regressed = task.clone();
        regressed.status = TaskStatus::Pending;
        assert!(matches!(
            state.update(&regressed),
            Err(Error::InvalidTransition { .. })
        ));
        assert_eq!(state.tasks[0].status, TaskStatus::Completed);
    }

    #[test]
    fn update_refuses_identity_change() {
        let mut state = QueueState::default();
        let now = Utc::now();
        state.enqueue(NewTask::new("1", "a"), now);
        let mut task = state.tasks[0].clone();
        task.source_id = "2".into();
        assert!(state.update(&task).is_err());
    }

    #[test]
    fn stale_copy_keeps_attached_response() {
        let mut state = QueueState::default();
        let now = Utc::now();
        state.enqueue(NewTask::new("1", "a"), now);
        let stale = state.claim_next(now).unwrap().unwrap();

        // An operator reply lands while the processor still holds `stale`.
        let mut replied = stale.clone();
        replied.response = Some("on it".into());
        state.update(&replied).unwrap();

        let mut categorized = stale;
        categorized.category = Some(crate::types::Category::Code);
        state.update(&categorized).unwrap();

        let stored = &state.tasks[0];
        assert_eq!(stored.response.as_deref(), Some("on it"));
        assert_eq!(stored.category, Some(crate::types::Category::Code));
        assert_eq!(stored.status, TaskStatus::Processing);
    }

    #[test]
    fn interrupted_tasks_are_failed_and_pending_left_alone() {
        let mut state = QueueState::default();
        let now = Utc::now();
        state.enqueue(NewTask::new("1", "claimed"), now);
        state.enqueue(NewTask::new("1", "waiting"), now);
        state.claim_next(now).unwrap();

        let failed = state.fail_interrupted("interrupted", now).unwrap();

        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].body, "claimed");
        assert_eq!(state.tasks[0].status, TaskStatus::Failed);
        assert_eq!(state.tasks[0].error.as_deref(), Some("interrupted"));
        assert!(state.tasks[0].processed_at.is_some());
        assert_eq!(state.tasks[1].status, TaskStatus::Pending);
        assert!(state.fail_interrupted("interrupted", now).unwrap().is_empty());
    }

    #[test]
    fn mark_seen_reports_novelty() {
        let mut state = QueueState::default();
        assert!(state.mark_seen("m1"));
        assert!(!state.mark_seen("m1"));
    }
}
