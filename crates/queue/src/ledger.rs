use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Ingest bookkeeping stored beside the task file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestLedger {
    /// Next task ID to hand out. Only ever grows, so IDs of deleted tasks
    /// are never reassigned.
    pub next_task_id: u64,
    /// Provider timestamp (unix seconds) of the newest polled message.
    pub cursor: Option<i64>,
    /// Provider message IDs already ingested, by webhook or poller.
    pub seen: BTreeSet<String>,
}

impl IngestLedger {
    /// Advance the cursor, never moving it backwards.
    pub fn advance_cursor(&mut self, cursor: i64) {
        self.cursor = Some(self.cursor.map_or(cursor, |c| c.max(cursor)));
    }
}
