//! Persistent task queue.
//!
//! Tasks live in `<data_dir>/tasks.json` (a JSON array), the dedup set, poll
//! cursor and ID high-water mark in `<data_dir>/ingest.json`. Every mutation
//! holds an exclusive lock on `<data_dir>/queue.lock` for the full
//! read-modify-write and replaces files by write-then-rename.

pub mod error;
pub mod ledger;
pub mod state;
pub mod store;
pub mod store_file;
pub mod store_memory;
pub mod types;

pub use {
    error::{Error, Result},
    store::TaskStore,
    store_file::FileTaskStore,
    store_memory::InMemoryTaskStore,
    types::{Category, Enqueued, NewTask, StatusCounts, Task, TaskStatus},
};
