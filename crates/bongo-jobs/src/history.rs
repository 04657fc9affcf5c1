//! Point-in-time reconstruction of note content.
//!
//! Reconstruction walks backward from the current content: with diffs
//! `d1..dn` (oldest first) the content as of `d_i` is the pre-image of `d_i`,
//! obtained by reverse-applying `d_n`, `d_{n-1}`, ..., `d_i` to a scratch copy
//! of current. Reads never go through the update queue.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use bongo_core::defaults::CURRENT_FILE_NAME;
use bongo_core::{DiffRecord, DiffRepository, Error, PatchProvider, Result};
use bongo_db::ContentStore;

/// Synchronous read side of the version-history pipeline.
#[derive(Clone)]
pub struct HistoryReader {
    store: ContentStore,
    diffs: Arc<dyn DiffRepository>,
    patcher: Arc<dyn PatchProvider>,
    history_lock: Arc<RwLock<()>>,
}

impl HistoryReader {
    pub fn new(
        store: ContentStore,
        diffs: Arc<dyn DiffRepository>,
        patcher: Arc<dyn PatchProvider>,
    ) -> Self {
        Self {
            store,
            diffs,
            patcher,
            history_lock: Arc::new(RwLock::new(())),
        }
    }

    /// Share the update worker's lock so reconstruction never pairs a diff
    /// chain with content from a different promotion.
    pub fn with_history_lock(mut self, lock: Arc<RwLock<()>>) -> Self {
        self.history_lock = lock;
        self
    }

    /// Current content of a note.
    pub async fn current(&self, note_id: Uuid) -> Result<Vec<u8>> {
        self.store.read_current(note_id).await
    }

    /// A note's diff records, oldest first.
    pub async fn history(&self, note_id: Uuid) -> Result<Vec<DiffRecord>> {
        self.diffs.list_records(note_id).await
    }

    /// Content of a note as it was right before `diff_id` was recorded.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if `diff_id` is not one of the note's diffs
    /// - [`Error::ContentMissing`] if the note has no current content
    /// - [`Error::DiffChainBroken`] if an artifact is missing or does not apply
    #[instrument(skip(self), fields(patcher = self.patcher.name()))]
    pub async fn at_diff(&self, note_id: Uuid, diff_id: Uuid) -> Result<Vec<u8>> {
        let scratch = TempDir::new()?;
        let work = scratch.path().join(CURRENT_FILE_NAME);

        let chain = {
            let _guard = self.history_lock.read().await;
            let chain = self.diffs.list_diffs(note_id).await?;
            if !chain.contains(&diff_id) {
                return Err(Error::InvalidInput(format!(
                    "diff {} does not belong to note {}",
                    diff_id, note_id
                )));
            }
            self.copy_current(note_id, &work).await?;
            chain
        };

        let rewind: Vec<Uuid> = chain
            .iter()
            .rev()
            .take_while(|id| **id != diff_id)
            .copied()
            .chain(std::iter::once(diff_id))
            .collect();

        for id in &rewind {
            let artifact = self.store.diff_path(note_id, *id);
            if !fs::try_exists(&artifact).await? {
                return Err(Error::DiffChainBroken(format!(
                    "artifact for diff {} of note {} is missing",
                    id, note_id
                )));
            }
            self.patcher.reverse_apply(&work, &artifact).await?;
        }

        debug!(
            note_id = %note_id,
            diff_id = %diff_id,
            reversed = rewind.len(),
            "Reconstructed note content"
        );

        Ok(fs::read(&work).await?)
    }

    async fn copy_current(&self, note_id: Uuid, work: &Path) -> Result<()> {
        let current = self.store.current_path(note_id);
        match fs::copy(&current, work).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::ContentMissing(
                format!("note {} has no current content", note_id),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bongo_db::InMemoryDiffRepository;

    /// Pairs with a differ whose payload is the whole old file: reversing just
    /// restores it.
    struct RestoreOld;

    #[async_trait]
    impl PatchProvider for RestoreOld {
        async fn reverse_apply(&self, target: &Path, diff: &Path) -> Result<()> {
            fs::copy(diff, target).await?;
            Ok(())
        }

        fn name(&self) -> &str {
            "restore_old"
        }
    }

    struct Fixture {
        _dir: TempDir,
        store: ContentStore,
        repo: Arc<InMemoryDiffRepository>,
        reader: HistoryReader,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());
        let repo = Arc::new(InMemoryDiffRepository::new());
        let reader = HistoryReader::new(store.clone(), repo.clone(), Arc::new(RestoreOld));
        Fixture {
            _dir: dir,
            store,
            repo,
            reader,
        }
    }

    /// Record a version change the way the worker would, storing the old
    /// content as the artifact.
    async fn record_version(f: &Fixture, note: Uuid, old: &[u8], new: &[u8]) -> Uuid {
        let id = Uuid::new_v4();
        fs::create_dir_all(f.store.diff_dir(note)).await.unwrap();
        fs::write(f.store.diff_path(note, id), old).await.unwrap();
        f.repo.record_diff(note, id).await.unwrap();
        fs::write(f.store.current_path(note), new).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_current_reads_promoted_content() {
        let f = fixture();
        let note = Uuid::new_v4();
        f.store.initialize(note, b"now").await.unwrap();
        assert_eq!(f.reader.current(note).await.unwrap(), b"now\n");
    }

    #[tokio::test]
    async fn test_current_missing_is_content_missing() {
        let f = fixture();
        assert!(matches!(
            f.reader.current(Uuid::new_v4()).await,
            Err(Error::ContentMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_at_diff_rewinds_to_pre_image() {
        let f = fixture();
        let note = Uuid::new_v4();
        f.store.initialize(note, b"v1").await.unwrap();
        let d1 = record_version(&f, note, b"v1\n", b"v2\n").await;
        let d2 = record_version(&f, note, b"v2\n", b"v3\n").await;

        assert_eq!(f.reader.at_diff(note, d1).await.unwrap(), b"v1\n");
        assert_eq!(f.reader.at_diff(note, d2).await.unwrap(), b"v2\n");
        // Reconstruction never touches current.
        assert_eq!(f.reader.current(note).await.unwrap(), b"v3\n");
    }

    #[tokio::test]
    async fn test_history_lists_in_creation_order() {
        let f = fixture();
        let note = Uuid::new_v4();
        f.store.initialize(note, b"a").await.unwrap();
        let d1 = record_version(&f, note, b"a\n", b"b\n").await;
        let d2 = record_version(&f, note, b"b\n", b"c\n").await;

        let ids: Vec<Uuid> = f
            .reader
            .history(note)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![d1, d2]);
    }

    #[tokio::test]
    async fn test_unknown_diff_is_invalid_input() {
        let f = fixture();
        let note = Uuid::new_v4();
        f.store.initialize(note, b"a").await.unwrap();

        assert!(matches!(
            f.reader.at_diff(note, Uuid::new_v4()).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_artifact_is_chain_broken() {
        let f = fixture();
        let note = Uuid::new_v4();
        f.store.initialize(note, b"a").await.unwrap();
        let d1 = record_version(&f, note, b"a\n", b"b\n").await;
        let d2 = record_version(&f, note, b"b\n", b"c\n").await;
        fs::remove_file(f.store.diff_path(note, d2)).await.unwrap();

        match f.reader.at_diff(note, d1).await {
            Err(Error::DiffChainBroken(msg)) => assert!(msg.contains(&d2.to_string())),
            other => panic!("expected DiffChainBroken, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_current_is_content_missing() {
        let f = fixture();
        let note = Uuid::new_v4();
        f.store.initialize(note, b"a").await.unwrap();
        let d1 = record_version(&f, note, b"a\n", b"b\n").await;
        fs::remove_file(f.store.current_path(note)).await.unwrap();

        assert!(matches!(
            f.reader.at_diff(note, d1).await,
            Err(Error::ContentMissing(_))
        ));
    }
}
