//! Ownership-checked note operations on top of the version-history pipeline.
//!
//! This service handles:
//! - Creating notes with their initial content
//! - Staging updates and handing them to the update queue
//! - Listing a notebook's notes
//! - Reading current or historical content

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use bongo_core::{Error, NoteRegistry, NoteSummary, NotebookAccess, Result, User};
use bongo_db::ContentStore;
use bongo_jobs::{HistoryReader, JobSubmitter};

/// Service for note operations.
#[derive(Clone)]
pub struct NotesService {
    store: ContentStore,
    access: Arc<dyn NotebookAccess>,
    registry: Arc<dyn NoteRegistry>,
    submitter: JobSubmitter,
    reader: HistoryReader,
}

impl NotesService {
    pub fn new(
        store: ContentStore,
        access: Arc<dyn NotebookAccess>,
        registry: Arc<dyn NoteRegistry>,
        submitter: JobSubmitter,
        reader: HistoryReader,
    ) -> Self {
        Self {
            store,
            access,
            registry,
            submitter,
            reader,
        }
    }

    /// Create a note in a notebook the user owns. Returns the new note id.
    pub async fn add_note(
        &self,
        user: User,
        notebook_id: Uuid,
        title: &str,
        content: &str,
    ) -> Result<Uuid> {
        validate_title(title)?;
        validate_content(content)?;
        self.require_notebook(user, notebook_id).await?;

        let note_id = Uuid::new_v4();
        let note_dir = self.store.initialize(note_id, content.as_bytes()).await?;
        if let Err(e) = self
            .registry
            .add_note(notebook_id, note_id, title, &note_dir)
            .await
        {
            warn!(note_id = %note_id, error = %e, "Registry rejected note; removing its content");
            self.store.remove_note(note_id).await?;
            return Err(e);
        }

        info!(user_id = %user.id, notebook_id = %notebook_id, note_id = %note_id, "Note created");
        Ok(note_id)
    }

    /// Stage new content for a note and queue the update. Returns the job id.
    ///
    /// The update is applied asynchronously; a full queue surfaces as
    /// [`Error::QueueSaturated`] and the caller may retry later.
    pub async fn update_note(
        &self,
        user: User,
        notebook_id: Uuid,
        note_id: Uuid,
        content: &str,
    ) -> Result<Uuid> {
        self.require_note(user, notebook_id, note_id).await?;
        validate_content(content)?;

        let staged = self.store.stage(content.as_bytes()).await?;
        let job_id = self.submitter.submit(note_id, staged).map_err(|e| {
            if e.is_retryable() {
                warn!(note_id = %note_id, error = %e, "Note update deferred; caller may retry");
            } else {
                error!(note_id = %note_id, error = %e, "Note update rejected");
            }
            e
        })?;

        debug!(user_id = %user.id, note_id = %note_id, job_id = %job_id, "Note update queued");
        Ok(job_id)
    }

    /// List the notes of a notebook the user owns.
    pub async fn fetch_notes(&self, user: User, notebook_id: Uuid) -> Result<Vec<NoteSummary>> {
        self.require_notebook(user, notebook_id).await?;
        self.registry.notes_for_notebook(notebook_id).await
    }

    /// Read a note's content, either current or as it was before diff `at`.
    pub async fn note_content(
        &self,
        user: User,
        notebook_id: Uuid,
        note_id: Uuid,
        at: Option<Uuid>,
    ) -> Result<Vec<u8>> {
        self.require_note(user, notebook_id, note_id).await?;
        match at {
            Some(diff_id) => self.reader.at_diff(note_id, diff_id).await,
            None => self.reader.current(note_id).await,
        }
    }

    async fn require_notebook(&self, user: User, notebook_id: Uuid) -> Result<()> {
        if self.access.user_owns_notebook(user.id, notebook_id).await? {
            return Ok(());
        }
        Err(Error::Forbidden(format!(
            "user {} does not own notebook {}",
            user.id, notebook_id
        )))
    }

    async fn require_note(&self, user: User, notebook_id: Uuid, note_id: Uuid) -> Result<()> {
        if self
            .access
            .note_in_notebook(user.id, notebook_id, note_id)
            .await?
        {
            return Ok(());
        }
        Err(Error::Forbidden(format!(
            "user {} has no access to note {} in notebook {}",
            user.id, note_id, notebook_id
        )))
    }
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::InvalidInput("note title must not be empty".to_string()));
    }
    Ok(())
}

/// Notes are plain text: NUL bytes mark binary content, which is never diffed.
fn validate_content(content: &str) -> Result<()> {
    if content.contains('\0') {
        return Err(Error::InvalidInput(
            "note content must be plain text".to_string(),
        ));
    }
    Ok(())
}
