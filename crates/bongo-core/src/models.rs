//! Core data models for bongo-notes.
//!
//! These types are shared across the content store, the update worker and the
//! notes service.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// USERS & NOTES
// =============================================================================

/// An authenticated user as seen by the notes service.
///
/// Authentication happens upstream; the service only needs the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
}

impl User {
    pub fn new(id: Uuid) -> Self {
        Self { id }
    }
}

/// Registry entry for a note inside a notebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSummary {
    pub id: Uuid,
    pub notebook_id: Uuid,
    pub title: String,
    /// Directory holding the note's current content and diff artifacts.
    pub path: PathBuf,
}

// =============================================================================
// VERSION HISTORY
// =============================================================================

/// Metadata row for one stored diff artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub id: Uuid,
    pub note_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Outcome of diffing two files.
///
/// The payload itself is streamed to the artifact path handed to the
/// [`DiffProvider`](crate::DiffProvider); only its length is reported here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOutcome {
    /// Files are identical; no payload was kept.
    Identical,
    /// Files differ; the payload has `payload_len` bytes.
    Changed { payload_len: u64 },
}

impl DiffOutcome {
    /// Whether the diff carries changes worth persisting.
    pub fn has_changes(&self) -> bool {
        matches!(self, DiffOutcome::Changed { .. })
    }
}

/// A pending content update, alive only inside the update queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateJob {
    pub id: Uuid,
    pub note_id: Uuid,
    pub staged_path: PathBuf,
}

impl UpdateJob {
    pub fn new(note_id: Uuid, staged_path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            note_id,
            staged_path: staged_path.into(),
        }
    }
}
