//! In-memory repository implementations.
//!
//! Used by tests and by embedders that do not need persistence. Each type
//! mirrors one production repository trait.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use bongo_core::{
    DiffRecord, DiffRepository, Error, NoteRegistry, NoteSummary, NotebookAccess, Result,
};

fn poisoned<T>(_: std::sync::PoisonError<T>) -> Error {
    Error::Internal("in-memory repository lock poisoned".to_string())
}

/// [`DiffRepository`] keeping records in insertion order.
#[derive(Default)]
pub struct InMemoryDiffRepository {
    records: Mutex<Vec<DiffRecord>>,
    fail_writes: Mutex<bool>,
}

impl InMemoryDiffRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `record_diff` fail, to exercise error paths.
    pub fn fail_writes(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_writes.lock() {
            *flag = fail;
        }
    }

    /// Total number of recorded diffs across all notes.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DiffRepository for InMemoryDiffRepository {
    async fn record_diff(&self, note_id: Uuid, diff_id: Uuid) -> Result<()> {
        if *self.fail_writes.lock().map_err(poisoned)? {
            return Err(Error::Internal("diff repository unavailable".to_string()));
        }
        let mut records = self.records.lock().map_err(poisoned)?;
        if records.iter().any(|r| r.id == diff_id) {
            return Err(Error::InvalidInput(format!("diff {} already recorded", diff_id)));
        }
        records.push(DiffRecord {
            id: diff_id,
            note_id,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_records(&self, note_id: Uuid) -> Result<Vec<DiffRecord>> {
        let records = self.records.lock().map_err(poisoned)?;
        Ok(records
            .iter()
            .filter(|r| r.note_id == note_id)
            .cloned()
            .collect())
    }
}

/// Notebook ownership and note registry sharing one in-memory table, so a
/// registered note is immediately visible to access checks.
#[derive(Default)]
pub struct InMemoryNotebooks {
    owners: Mutex<HashMap<Uuid, Uuid>>,
    notes: Mutex<Vec<NoteSummary>>,
}

impl InMemoryNotebooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `user_id` owns `notebook_id`.
    pub fn grant_notebook(&self, user_id: Uuid, notebook_id: Uuid) {
        if let Ok(mut owners) = self.owners.lock() {
            owners.insert(notebook_id, user_id);
        }
    }
}

#[async_trait]
impl NotebookAccess for InMemoryNotebooks {
    async fn user_owns_notebook(&self, user_id: Uuid, notebook_id: Uuid) -> Result<bool> {
        let owners = self.owners.lock().map_err(poisoned)?;
        Ok(owners.get(&notebook_id) == Some(&user_id))
    }

    async fn note_in_notebook(
        &self,
        user_id: Uuid,
        notebook_id: Uuid,
        note_id: Uuid,
    ) -> Result<bool> {
        if !self.user_owns_notebook(user_id, notebook_id).await? {
            return Ok(false);
        }
        let notes = self.notes.lock().map_err(poisoned)?;
        Ok(notes
            .iter()
            .any(|n| n.id == note_id && n.notebook_id == notebook_id))
    }
}

#[async_trait]
impl NoteRegistry for InMemoryNotebooks {
    async fn add_note(
        &self,
        notebook_id: Uuid,
        note_id: Uuid,
        title: &str,
        path: &Path,
    ) -> Result<()> {
        let mut notes = self.notes.lock().map_err(poisoned)?;
        if notes.iter().any(|n| n.id == note_id) {
            return Err(Error::InvalidInput(format!("note {} already registered", note_id)));
        }
        notes.push(NoteSummary {
            id: note_id,
            notebook_id,
            title: title.to_string(),
            path: path.to_path_buf(),
        });
        Ok(())
    }

    async fn notes_for_notebook(&self, notebook_id: Uuid) -> Result<Vec<NoteSummary>> {
        let notes = self.notes.lock().map_err(poisoned)?;
        Ok(notes
            .iter()
            .filter(|n| n.notebook_id == notebook_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_diffs_listed_in_insertion_order() {
        let repo = InMemoryDiffRepository::new();
        let note = Uuid::new_v4();
        let other = Uuid::new_v4();
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();

        for id in &ids {
            repo.record_diff(note, *id).await.unwrap();
            repo.record_diff(other, Uuid::new_v4()).await.unwrap();
        }

        assert_eq!(repo.list_diffs(note).await.unwrap(), ids);
        assert_eq!(repo.len(), 10);
    }

    #[tokio::test]
    async fn test_duplicate_diff_id_rejected() {
        let repo = InMemoryDiffRepository::new();
        let note = Uuid::new_v4();
        let id = Uuid::new_v4();
        repo.record_diff(note, id).await.unwrap();
        assert!(repo.record_diff(note, id).await.is_err());
    }

    #[tokio::test]
    async fn test_fail_writes_toggle() {
        let repo = InMemoryDiffRepository::new();
        repo.fail_writes(true);
        assert!(repo.record_diff(Uuid::new_v4(), Uuid::new_v4()).await.is_err());
        repo.fail_writes(false);
        assert!(repo.record_diff(Uuid::new_v4(), Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn test_notebook_access_follows_registry() {
        let notebooks = InMemoryNotebooks::new();
        let user = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let notebook = Uuid::new_v4();
        let note = Uuid::new_v4();

        notebooks.grant_notebook(user, notebook);
        assert!(notebooks.user_owns_notebook(user, notebook).await.unwrap());
        assert!(!notebooks.user_owns_notebook(stranger, notebook).await.unwrap());
        assert!(!notebooks.note_in_notebook(user, notebook, note).await.unwrap());

        notebooks
            .add_note(notebook, note, "todo", Path::new("/notes/x"))
            .await
            .unwrap();

        assert!(notebooks.note_in_notebook(user, notebook, note).await.unwrap());
        assert!(!notebooks.note_in_notebook(stranger, notebook, note).await.unwrap());
        assert!(!notebooks
            .note_in_notebook(user, Uuid::new_v4(), note)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_note_registry_filters_by_notebook() {
        let notebooks = InMemoryNotebooks::new();
        let notebook = Uuid::new_v4();
        let note = Uuid::new_v4();
        notebooks
            .add_note(notebook, note, "todo", Path::new("/notes/x"))
            .await
            .unwrap();
        notebooks
            .add_note(Uuid::new_v4(), Uuid::new_v4(), "other", Path::new("/notes/y"))
            .await
            .unwrap();

        let notes = notebooks.notes_for_notebook(notebook).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, note);
        assert_eq!(notes[0].title, "todo");
        assert!(notebooks
            .add_note(notebook, note, "again", Path::new("/notes/x"))
            .await
            .is_err());
    }
}
