use std::path::PathBuf;

use thiserror::Error;

use crate::types::TaskStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The queue or ledger file exists but cannot be used. The file is left
    /// untouched.
    #[error("queue file {path} is unusable: {message}")]
    Persistence { path: PathBuf, message: String },

    #[error("failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("task not found: {id}")]
    TaskNotFound { id: u64 },

    #[error("task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: u64,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn persistence(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn task_not_found(id: u64) -> Self {
        Self::TaskNotFound { id }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

impl taskbridge_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

taskbridge_common::impl_context!();
