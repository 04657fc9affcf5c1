//! # bongo-jobs
//!
//! Update queue, diff engine and reconstruction for bongo-notes.
//!
//! This crate provides:
//! - A bounded, fail-fast update queue drained by a single worker
//! - External `diff`/`patch` providers with exit-status classification
//! - Point-in-time reconstruction by reverse-applying stored diffs
//! - Worker notifications via broadcast channels
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bongo_db::{ContentStore, InMemoryDiffRepository};
//! use bongo_jobs::{HistoryReader, QueueConfig, ToolConfig, UpdateQueue};
//!
//! let tools = ToolConfig::from_env().resolve()?;
//! let store = ContentStore::new("./data/notes");
//! let diffs = Arc::new(InMemoryDiffRepository::new());
//!
//! let queue = UpdateQueue::new(store.clone(), diffs.clone(), Arc::new(tools.diff()), QueueConfig::from_env());
//! let reader = HistoryReader::new(store.clone(), diffs, Arc::new(tools.patch()))
//!     .with_history_lock(queue.history_lock());
//! let handle = queue.start()?;
//!
//! let staged = store.stage(b"hello world").await?;
//! handle.submitter().submit(note_id, staged)?;
//!
//! // Graceful shutdown
//! handle.shutdown().await?;
//! ```

pub mod history;
pub mod queue;
pub mod tools;

// Re-export core types
pub use bongo_core::*;

pub use history::HistoryReader;
pub use queue::{JobSubmitter, QueueConfig, QueueHandle, UpdateQueue, WorkerEvent};
pub use tools::{locate_executable, ExternalDiff, ExternalPatch, ToolConfig};
