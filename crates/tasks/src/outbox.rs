//! Append-only JSONL outbox for formatted tasks.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    chrono::{DateTime, Utc},
    fd_lock::RwLock,
    serde::{Deserialize, Serialize},
    taskbridge_queue::{Category, Task},
};

use crate::{Error, Result};

pub const OUTBOX_FILE: &str = "outbox.jsonl";

/// One line of the outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub task_id: u64,
    pub category: Option<Category>,
    pub source_id: String,
    pub content: String,
    pub emitted_at: DateTime<Utc>,
}

impl OutboxEntry {
    #[must_use]
    pub fn new(task: &Task, content: String) -> Self {
        Self {
            task_id: task.id,
            category: task.category,
            source_id: task.source_id.clone(),
            content,
            emitted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Outbox {
    path: Arc<PathBuf>,
}

impl Outbox {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    /// `<data_dir>/outbox.jsonl`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(OUTBOX_FILE))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry as a single line, holding an exclusive lock so lines
    /// from concurrent writers never interleave.
    pub async fn append(&self, entry: &OutboxEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let path = Arc::clone(&self.path);
        tokio::task::spawn_blocking(move || {
            append_line(&path, &line).map_err(|source| Error::Outbox {
                path: path.to_path_buf(),
                source,
            })
        })
        .await?
    }

    /// Every entry written so far. Unparseable lines are skipped.
    pub async fn read_all(&self) -> Result<Vec<OutboxEntry>> {
        let path = Arc::clone(&self.path);
        tokio::task::spawn_blocking(move || {
            let raw = match fs::read_to_string(path.as_path()) {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(source) => {
                    return Err(Error::Outbox {
                        path: path.to_path_buf(),
                        source,
                    });
                },
            };
            Ok(raw
                .lines()
                .filter_map(|line| serde_json::from_str(line).ok())
                .collect())
        })
        .await?
    }
}

fn append_line(path: &Path, line: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut lock = RwLock::new(file);
    let mut guard = lock.write()?;
    guard.write_all(line)?;
    guard.sync_data()
}
