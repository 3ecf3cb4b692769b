//! JSON file-backed task store with an exclusive file lock and atomic writes.

use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    async_trait::async_trait,
    chrono::Utc,
    fd_lock::RwLock,
    tracing::{debug, warn},
};

use crate::{
    Error, Result,
    ledger::IngestLedger,
    state::QueueState,
    store::TaskStore,
    types::{Enqueued, NewTask, Task},
};

const TASKS_FILE: &str = "tasks.json";
const LEDGER_FILE: &str = "ingest.json";
const LOCK_FILE: &str = "queue.lock";

#[derive(Debug, Clone)]
struct QueuePaths {
    dir: PathBuf,
    tasks: PathBuf,
    ledger: PathBuf,
    lock: PathBuf,
}

/// File-backed store. Safe to share between processes on the same host.
pub struct FileTaskStore {
    paths: Arc<QueuePaths>,
}

impl FileTaskStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let dir = data_dir.into();
        Self {
            paths: Arc::new(QueuePaths {
                tasks: dir.join(TASKS_FILE),
                ledger: dir.join(LEDGER_FILE),
                lock: dir.join(LOCK_FILE),
                dir,
            }),
        }
    }

    pub fn tasks_path(&self) -> &Path {
        &self.paths.tasks
    }

    pub fn ledger_path(&self) -> &Path {
        &self.paths.ledger
    }

    /// Run `f` against the current state under the exclusive lock and persist
    /// the result if it changed.
    async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut QueueState) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let paths = Arc::clone(&self.paths);
        tokio::task::spawn_blocking(move || -> Result<T> {
            let mut lock = open_lock(&paths)?;
            let _guard = lock.write().map_err(|source| Error::Lock {
                path: paths.lock.clone(),
                source,
            })?;

            let mut state = load_state(&paths)?;
            let before = state.clone();
            let out = f(&mut state)?;
            if state != before {
                save_state(&paths, &before, &state)?;
            }
            Ok(out)
        })
        .await?
    }

    /// Run `f` against a consistent snapshot under the shared lock.
    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(QueueState) -> T + Send + 'static,
        T: Send + 'static,
    {
        let paths = Arc::clone(&self.paths);
        tokio::task::spawn_blocking(move || -> Result<T> {
            let lock = open_lock(&paths)?;
            let _guard = lock.read().map_err(|source| Error::Lock {
                path: paths.lock.clone(),
                source,
            })?;
            Ok(f(load_state(&paths)?))
        })
        .await?
    }
}

fn open_lock(paths: &QueuePaths) -> Result<RwLock<File>> {
    fs::create_dir_all(&paths.dir)?;
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&paths.lock)?;
    Ok(RwLock::new(file))
}

fn load_state(paths: &QueuePaths) -> Result<QueueState> {
    let ledger: Option<IngestLedger> = read_json(&paths.ledger)?;
    let tasks: Vec<Task> = match read_json(&paths.tasks)? {
        Some(tasks) => tasks,
        None => {
            if ledger.is_some() {
                // The ledger proves the queue existed; someone removed it.
                let err = Error::persistence(&paths.tasks, "file is missing");
                warn!(error = %err, "treating queue as empty");
            } else {
                debug!(path = %paths.tasks.display(), "no queue file yet");
            }
            Vec::new()
        },
    };
    Ok(QueueState {
        tasks,
        ledger: ledger.unwrap_or_default(),
    })
}

/// `Ok(None)` when the file does not exist. A file that exists but does not
/// parse is a persistence error, and it is never overwritten.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::persistence(path, e)),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| Error::persistence(path, e))
}

fn save_state(paths: &QueuePaths, before: &QueueState, after: &QueueState) -> Result<()> {
    // Tasks first: a crash before the ledger write is healed on the next load
    // because dedup and ID allocation also consult the task list.
    if after.tasks != before.tasks {
        write_atomic(&paths.tasks, &serde_json::to_vec_pretty(&after.tasks)?)?;
    }
    if after.ledger != before.ledger {
        write_atomic(&paths.ledger, &serde_json::to_vec_pretty(&after.ledger)?)?;
    }
    Ok(())
}

/// Write to a sibling temp file, fsync, then rename over the target. Readers
/// see either the old or the new content, never a partial file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    if let Err(e) = write_and_rename(&tmp, path, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(Error::persistence(path, e));
    }
    Ok(())
}

fn write_and_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(tmp, path)
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn enqueue(&self, task: NewTask) -> Result<Enqueued> {
        self.mutate(move |state| Ok(state.enqueue(task, Utc::now())))
            .await
    }

    async fn enqueue_batch(&self, tasks: Vec<NewTask>, cursor: Option<i64>) -> Result<Vec<Task>> {
        self.mutate(move |state| Ok(state.enqueue_batch(tasks, cursor, Utc::now())))
            .await
    }

    async fn mark_seen(&self, provider_message_id: &str) -> Result<bool> {
        let id = provider_message_id.to_string();
        self.mutate(move |state| Ok(state.mark_seen(&id))).await
    }

    async fn is_seen(&self, provider_message_id: &str) -> Result<bool> {
        let id = provider_message_id.to_string();
        self.read(move |state| state.is_seen(&id)).await
    }

    async fn cursor(&self) -> Result<Option<i64>> {
        self.read(|state| state.ledger.cursor).await
    }

    async fn get(&self, id: u64) -> Result<Option<Task>> {
        self.read(move |state| state.tasks.into_iter().find(|t| t.id == id))
            .await
    }

    async fn list(&self) -> Result<Vec<Task>> {
        self.read(|state| {
            let mut tasks = state.tasks;
            tasks.sort_by_key(|t| t.id);
            tasks
        })
        .await
    }

    async fn claim_next(&self) -> Result<Option<Task>> {
        self.mutate(|state| state.claim_next(Utc::now())).await
    }

    async fn update(&self, task: &Task) -> Result<()> {
        let task = task.clone();
        self.mutate(move |state| state.update(&task)).await
    }

    async fn fail_interrupted(&self, reason: &str) -> Result<Vec<Task>> {
        let reason = reason.to_string();
        self.mutate(move |state| state.fail_interrupted(&reason, Utc::now()))
            .await
    }

    async fn delete(&self, id: u64) -> Result<Task> {
        self.mutate(move |state| state.delete(id)).await
    }
}
