//! Error types for bongo-notes.

use thiserror::Error;

/// Result type alias using bongo-notes' Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for bongo-notes operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An expected file is absent (current content, staged content).
    ///
    /// Usually a caller bug, e.g. updating a note that was never created.
    #[error("Content missing: {0}")]
    ContentMissing(String),

    /// The external diff or patch tool failed or misbehaved.
    #[error("Diff tool error: {0}")]
    DiffTool(String),

    /// Diff metadata and stored artifacts disagree, or an artifact no longer applies.
    #[error("Diff chain broken: {0}")]
    DiffChainBroken(String),

    /// The update queue is full; retry later.
    #[error("Update queue saturated (capacity {0})")]
    QueueSaturated(usize),

    /// The update worker has stopped and no longer accepts jobs.
    #[error("Update queue closed")]
    QueueClosed,

    /// Another process already runs the update worker for this notes root.
    #[error("Update worker already running (lock held on {0})")]
    WorkerActive(String),

    /// Note not found
    #[error("Note not found: {0}")]
    NoteNotFound(uuid::Uuid),

    /// Authenticated but not authorized for the notebook or note
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller can reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::QueueSaturated(_))
    }
}
