//! Message bodies answered directly instead of being queued.

use {
    taskbridge_common::text::{single_line, truncate_chars},
    taskbridge_queue::{StatusCounts, Task, TaskStatus, TaskStore},
};

use crate::Result;

const LIST_LIMIT: usize = 5;
const LIST_PREVIEW_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Status,
    Help,
    List,
}

impl ControlCommand {
    /// Recognize a command body. The whole trimmed body must be the command
    /// word, case-insensitive, with an optional leading `/`.
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        let word = body.trim();
        let word = word.strip_prefix('/').unwrap_or(word);
        match word.to_ascii_lowercase().as_str() {
            "status" => Some(Self::Status),
            "help" => Some(Self::Help),
            "list" => Some(Self::List),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Help => "help",
            Self::List => "list",
        }
    }

    /// Build the reply text.
    pub async fn reply(self, store: &dyn TaskStore) -> Result<String> {
        Ok(match self {
            Self::Status => status_text(&store.counts().await?),
            Self::Help => help_text(),
            Self::List => list_text(&store.list_by_status(TaskStatus::Pending).await?),
        })
    }
}

fn status_text(counts: &StatusCounts) -> String {
    format!(
        "Tasks: {} pending, {} processing, {} completed, {} failed.",
        counts.pending, counts.processing, counts.completed, counts.failed
    )
}

fn help_text() -> String {
    "Send any message to queue it as a task.\n\
     Commands:\n\
     status - task counts\n\
     list - latest pending tasks\n\
     help - this message"
        .to_string()
}

fn list_text(pending: &[Task]) -> String {
    if pending.is_empty() {
        return "No pending tasks.".to_string();
    }
    let mut lines = vec![format!("Pending tasks ({}):", pending.len())];
    lines.extend(pending.iter().rev().take(LIST_LIMIT).map(|t| {
        format!(
            "#{} {}",
            t.id,
            truncate_chars(&single_line(&t.body), LIST_PREVIEW_CHARS)
        )
    }));
    lines.join("\n")
}
