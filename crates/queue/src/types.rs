use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::{Error, Result};

/// Task lifecycle state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, waiting for the processor.
    Pending,
    /// Claimed by the processor.
    Processing,
    Completed,
    /// Processing or reply delivery failed; `error` holds the reason.
    Failed,
}

impl TaskStatus {
    pub const ALL: [Self; 4] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a task may move from `self` to `next`.
    ///
    /// Staying in the same state is allowed so fields (category, response,
    /// error) can be attached without a status change.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Pending | Self::Processing)
                | (
                    Self::Processing,
                    Self::Processing | Self::Completed | Self::Failed
                )
                | (Self::Completed, Self::Completed)
                | (Self::Failed, Self::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::message(format!("unknown task status: {other}"))),
        }
    }
}

/// Coarse classification of a task's intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Code,
    Research,
    Note,
    Reminder,
    General,
}

impl Category {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Research => "research",
            Self::Note => "note",
            Self::Reminder => "reminder",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of inbound message work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    /// Sender phone number or chat ID; replies are routed here.
    pub source_id: String,
    /// Provider message ID, the dedup key for webhook and poller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    pub body: String,
    #[serde(default)]
    pub category: Option<Category>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Task {
    /// Move to `next`, stamping `processed_at` on terminal states.
    pub fn transition_to(&mut self, next: TaskStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        if next.is_terminal() && self.processed_at.is_none() {
            self.processed_at = Some(now);
        }
        self.status = next;
        Ok(())
    }

    /// Mark failed and capture the reason. The body is kept for requeueing.
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.transition_to(TaskStatus::Failed, now)?;
        self.error = Some(error.into());
        Ok(())
    }
}

/// Input for [`crate::TaskStore::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub source_id: String,
    pub body: String,
    pub provider_message_id: Option<String>,
}

impl NewTask {
    pub fn new(source_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            body: body.into(),
            provider_message_id: None,
        }
    }

    #[must_use]
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.provider_message_id = Some(id.into());
        self
    }
}

/// Outcome of a single enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    Created(Task),
    /// The provider message ID was already ingested; nothing was written.
    Duplicate { provider_message_id: String },
}

impl Enqueued {
    #[must_use]
    pub fn task(&self) -> Option<&Task> {
        match self {
            Self::Created(task) => Some(task),
            Self::Duplicate { .. } => None,
        }
    }
}

/// Number of tasks in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    #[must_use]
    pub fn from_tasks(tasks: &[Task]) -> Self {
        tasks.iter().fold(Self::default(), |mut acc, t| {
            match t.status {
                TaskStatus::Pending => acc.pending += 1,
                TaskStatus::Processing => acc.processing += 1,
                TaskStatus::Completed => acc.completed += 1,
                TaskStatus::Failed => acc.failed += 1,
            }
            acc
        })
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}
