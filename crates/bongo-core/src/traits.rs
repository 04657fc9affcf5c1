//! Core traits for bongo-notes abstractions.
//!
//! These traits define the seams between the version-history pipeline and its
//! collaborators, enabling pluggable backends and in-memory fakes for tests.

use std::path::Path;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// VERSION METADATA
// =============================================================================

/// Repository mapping notes to their diff artifacts.
#[async_trait]
pub trait DiffRepository: Send + Sync {
    /// Record a freshly written diff artifact for a note.
    async fn record_diff(&self, note_id: Uuid, diff_id: Uuid) -> Result<()>;

    /// List a note's diff records in creation order (oldest first).
    async fn list_records(&self, note_id: Uuid) -> Result<Vec<DiffRecord>>;

    /// List a note's diff ids in creation order (oldest first).
    async fn list_diffs(&self, note_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .list_records(note_id)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect())
    }
}

// =============================================================================
// ACCESS & REGISTRY
// =============================================================================

/// Ownership checks consulted before any note operation.
#[async_trait]
pub trait NotebookAccess: Send + Sync {
    /// Whether `user_id` owns `notebook_id`.
    async fn user_owns_notebook(&self, user_id: Uuid, notebook_id: Uuid) -> Result<bool>;

    /// Whether `note_id` lives in `notebook_id` and that notebook belongs to `user_id`.
    async fn note_in_notebook(&self, user_id: Uuid, notebook_id: Uuid, note_id: Uuid)
        -> Result<bool>;
}

/// Registry of notes per notebook.
#[async_trait]
pub trait NoteRegistry: Send + Sync {
    /// Register a new note whose content lives under `path`.
    async fn add_note(&self, notebook_id: Uuid, note_id: Uuid, title: &str, path: &Path)
        -> Result<()>;

    /// List the notes of a notebook.
    async fn notes_for_notebook(&self, notebook_id: Uuid) -> Result<Vec<NoteSummary>>;
}

// =============================================================================
// DIFF & PATCH PROVIDERS
// =============================================================================

/// Computes line-based diffs between two files.
#[async_trait]
pub trait DiffProvider: Send + Sync {
    /// Diff `old` against `new`, streaming any payload into `artifact`.
    ///
    /// On [`DiffOutcome::Identical`] nothing is left at `artifact`.
    async fn diff(&self, old: &Path, new: &Path, artifact: &Path) -> Result<DiffOutcome>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}

/// Applies diff payloads produced by a [`DiffProvider`].
#[async_trait]
pub trait PatchProvider: Send + Sync {
    /// Reverse-apply `diff` to `target` in place, turning the post-image into the pre-image.
    async fn reverse_apply(&self, target: &Path, diff: &Path) -> Result<()>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}
