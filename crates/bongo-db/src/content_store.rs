//! Filesystem content store for note versions.
//!
//! Layout under the notes root:
//!
//! ```text
//! {root}/temp/{sha1}              staged content, content-addressed
//! {root}/{note_id}/recent         current content (exactly one per note)
//! {root}/{note_id}/diffs/{uuid}   immutable diff artifacts
//! ```
//!
//! Content is newline-normalized (a trailing `\n` is appended when missing)
//! before it is hashed or written, so diffs never carry a spurious
//! "no newline at end of file" hunk.
//!
//! Promotion relies on `link(2)` and on `rename(2)` replacing the destination
//! atomically, which holds on POSIX filesystems when the whole notes root
//! lives on one mount.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha1::{Digest, Sha1};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bongo_core::defaults::{
    CURRENT_FILE_NAME, DIFFS_DIR_NAME, PARTIAL_EXTENSION, STAGING_DIR_NAME,
};
use bongo_core::{Error, Result};

use crate::worker_lock::WorkerLock;

/// Append a trailing newline when the content lacks one.
pub fn normalize_line_break(content: &[u8]) -> Cow<'_, [u8]> {
    if content.ends_with(b"\n") {
        Cow::Borrowed(content)
    } else {
        let mut owned = Vec::with_capacity(content.len() + 1);
        owned.extend_from_slice(content);
        owned.push(b'\n');
        Cow::Owned(owned)
    }
}

/// Lower-case hex SHA-1 of the given bytes.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

/// Filesystem store holding current content, diff artifacts and staged content.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Create a store rooted at `root`. No I/O happens until the first operation.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding everything belonging to a note.
    pub fn note_dir(&self, note_id: Uuid) -> PathBuf {
        self.root.join(note_id.as_hyphenated().to_string())
    }

    /// Path of the note's current content. Existence is not checked.
    pub fn current_path(&self, note_id: Uuid) -> PathBuf {
        self.note_dir(note_id).join(CURRENT_FILE_NAME)
    }

    pub fn diff_dir(&self, note_id: Uuid) -> PathBuf {
        self.note_dir(note_id).join(DIFFS_DIR_NAME)
    }

    /// Path of a diff artifact, named by its own id.
    pub fn diff_path(&self, note_id: Uuid, diff_id: Uuid) -> PathBuf {
        self.diff_dir(note_id)
            .join(diff_id.as_hyphenated().to_string())
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR_NAME)
    }

    /// Stage content under its SHA-1 and return the staged path.
    ///
    /// Re-staging identical bytes returns the same path and refreshes its
    /// mtime, so [`ContentStore::prune_staging`] ages it from the latest stage.
    pub async fn stage(&self, content: &[u8]) -> Result<PathBuf> {
        let content = normalize_line_break(content);
        let hash = content_hash(&content);
        let staging_dir = self.staging_dir();
        let staged = staging_dir.join(&hash);

        if touch(&staged).await? {
            debug!(op = "stage", path = %staged.display(), "Content already staged");
            return Ok(staged);
        }

        fs::create_dir_all(&staging_dir).await?;
        let partial = staging_dir.join(format!("{}.{}.{}", hash, Uuid::new_v4(), PARTIAL_EXTENSION));
        write_synced(&partial, &content).await?;
        fs::rename(&partial, &staged).await.map_err(|e| {
            warn!(from = %partial.display(), to = %staged.display(), error = %e, "content_store: rename failed");
            e
        })?;

        debug!(op = "stage", path = %staged.display(), bytes = content.len(), "Staged content");
        Ok(staged)
    }

    /// Create a note's directory and write its first current content.
    pub async fn initialize(&self, note_id: Uuid, content: &[u8]) -> Result<PathBuf> {
        let current = self.current_path(note_id);
        if fs::try_exists(&current).await? {
            return Err(Error::InvalidInput(format!(
                "note {} already has current content",
                note_id
            )));
        }

        let note_dir = self.note_dir(note_id);
        fs::create_dir_all(&note_dir).await?;

        let content = normalize_line_break(content);
        let partial = current.with_extension(PARTIAL_EXTENSION);
        write_synced(&partial, &content).await?;
        fs::rename(&partial, &current).await?;

        info!(note_id = %note_id, bytes = content.len(), "Initialized note content");
        Ok(note_dir)
    }

    /// Replace the note's current content with the file at `new_content`.
    ///
    /// The new content is hard-linked next to `recent` and renamed over it, so
    /// readers see either the old or the new file. The staged file itself is
    /// left in place because other pending jobs may share its content address.
    pub async fn promote(&self, note_id: Uuid, new_content: &Path) -> Result<()> {
        let current = self.current_path(note_id);
        if !fs::try_exists(&current).await? {
            return Err(Error::ContentMissing(format!(
                "no current content for note {} at {}",
                note_id,
                current.display()
            )));
        }
        if !fs::try_exists(new_content).await? {
            return Err(Error::ContentMissing(format!(
                "no new content for note {} at {}",
                note_id,
                new_content.display()
            )));
        }

        link_into_place(new_content, &current).await?;

        debug!(op = "promote", note_id = %note_id, from = %new_content.display(), "Promoted content");
        Ok(())
    }

    /// Make staged content the first current content of a note.
    ///
    /// Used when an update arrives for a note that has no current file yet; no
    /// diff exists for a baseline.
    pub async fn establish(&self, note_id: Uuid, new_content: &Path) -> Result<()> {
        if !fs::try_exists(new_content).await? {
            return Err(Error::ContentMissing(format!(
                "no new content for note {} at {}",
                note_id,
                new_content.display()
            )));
        }
        let current = self.current_path(note_id);
        if fs::try_exists(&current).await? {
            return Err(Error::InvalidInput(format!(
                "note {} already has current content",
                note_id
            )));
        }

        fs::create_dir_all(self.note_dir(note_id)).await?;
        link_into_place(new_content, &current).await?;

        info!(note_id = %note_id, "Established note baseline");
        Ok(())
    }

    /// Read the note's current content.
    pub async fn read_current(&self, note_id: Uuid) -> Result<Vec<u8>> {
        let current = self.current_path(note_id);
        match fs::read(&current).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::ContentMissing(
                format!("no current content for note {}", note_id),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the note has current content.
    pub async fn has_current(&self, note_id: Uuid) -> Result<bool> {
        Ok(fs::try_exists(self.current_path(note_id)).await?)
    }

    /// Delete a note's current content and all of its diff artifacts.
    pub async fn remove_note(&self, note_id: Uuid) -> Result<()> {
        let note_dir = self.note_dir(note_id);
        match fs::remove_dir_all(&note_dir).await {
            Ok(()) => {
                info!(note_id = %note_id, "Removed note content");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reserve this store for the calling process's update worker.
    pub fn lock_worker(&self) -> Result<WorkerLock> {
        WorkerLock::acquire(&self.root)
    }

    /// Remove staged files not modified within `max_age`. Returns how many were removed.
    pub async fn prune_staging(&self, max_age: Duration) -> Result<usize> {
        let staging_dir = self.staging_dir();
        let mut entries = match fs::read_dir(&staging_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let modified = entry.metadata().await?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age >= max_age {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Pruned staged content");
        }
        Ok(removed)
    }

    /// Check that the store can create, write, read and delete files.
    ///
    /// Runs at startup to catch permission or mount problems before the
    /// worker starts mutating notes.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let test_dir = self.root.join(".health-check");
        let test_file = test_dir.join("check");

        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", test_dir, e))?;

        let data = b"content-store-health-check";
        fs::write(&test_file, data)
            .await
            .map_err(|e| format!("write({:?}): {}", test_file, e))?;

        let read_data = fs::read(&test_file)
            .await
            .map_err(|e| format!("read({:?}): {}", test_file, e))?;
        if read_data != data {
            return Err("read-back mismatch".to_string());
        }

        fs::remove_file(&test_file)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", test_file, e))?;
        let _ = fs::remove_dir(&test_dir).await;

        Ok(())
    }
}

/// Hard-link `source` next to `dest` and rename it over `dest`.
async fn link_into_place(source: &Path, dest: &Path) -> Result<()> {
    let incoming = dest.with_extension(PARTIAL_EXTENSION);
    if fs::try_exists(&incoming).await? {
        fs::remove_file(&incoming).await?;
    }
    fs::hard_link(source, &incoming).await?;
    fs::rename(&incoming, dest).await.map_err(|e| {
        warn!(from = %incoming.display(), to = %dest.display(), error = %e, "content_store: rename failed");
        e
    })?;
    // Renaming a link onto the same inode is a no-op that leaves the source behind.
    if fs::try_exists(&incoming).await? {
        fs::remove_file(&incoming).await?;
    }
    Ok(())
}

/// Set an existing file's mtime to now. Returns `false` when the file is absent.
async fn touch(path: &Path) -> Result<bool> {
    let file = match fs::OpenOptions::new().write(true).open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    file.into_std().await.set_modified(SystemTime::now())?;
    Ok(true)
}

async fn write_synced(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path).await.map_err(|e| {
        warn!(path = %path.display(), error = %e, "content_store: File::create failed");
        e
    })?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}
