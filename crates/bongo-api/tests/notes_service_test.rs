//! Integration tests for NotesService over in-memory repositories.
//!
//! The diff and patch providers here snapshot whole files, so these tests run
//! without the system tools.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bongo_api::NotesService;
use bongo_core::{
    DiffOutcome, DiffProvider, Error, NoteRegistry, NoteSummary, PatchProvider, Result, User,
};
use bongo_db::{ContentStore, InMemoryDiffRepository, InMemoryNotebooks};
use bongo_jobs::{HistoryReader, QueueConfig, QueueHandle, UpdateQueue, WorkerEvent};
use tempfile::TempDir;
use tokio::fs;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Stores the old file as the diff payload.
struct SnapshotDiff;

#[async_trait]
impl DiffProvider for SnapshotDiff {
    async fn diff(&self, old: &Path, new: &Path, artifact: &Path) -> Result<DiffOutcome> {
        let old = fs::read(old).await?;
        if old == fs::read(new).await? {
            return Ok(DiffOutcome::Identical);
        }
        fs::write(artifact, &old).await?;
        Ok(DiffOutcome::Changed {
            payload_len: old.len() as u64,
        })
    }

    fn name(&self) -> &str {
        "snapshot"
    }
}

struct SnapshotPatch;

#[async_trait]
impl PatchProvider for SnapshotPatch {
    async fn reverse_apply(&self, target: &Path, diff: &Path) -> Result<()> {
        fs::copy(diff, target).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "snapshot"
    }
}

struct Harness {
    _dir: TempDir,
    service: NotesService,
    notebooks: Arc<InMemoryNotebooks>,
    handle: QueueHandle,
    events: broadcast::Receiver<WorkerEvent>,
}

fn harness(capacity: usize) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = ContentStore::new(dir.path());
    let diffs = Arc::new(InMemoryDiffRepository::new());
    let notebooks = Arc::new(InMemoryNotebooks::new());

    let queue = UpdateQueue::new(
        store.clone(),
        diffs.clone(),
        Arc::new(SnapshotDiff),
        QueueConfig::default().with_capacity(capacity),
    );
    let reader = HistoryReader::new(store.clone(), diffs, Arc::new(SnapshotPatch))
        .with_history_lock(queue.history_lock());
    let events = queue.events();
    let submitter = queue.submitter();

    let service = NotesService::new(
        store,
        notebooks.clone(),
        notebooks.clone(),
        submitter,
        reader,
    );

    Harness {
        _dir: dir,
        service,
        notebooks,
        handle: queue.start().unwrap(),
        events,
    }
}

async fn wait_for(events: &mut broadcast::Receiver<WorkerEvent>, job_id: Uuid) -> WorkerEvent {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.unwrap();
            let finished = matches!(
                &event,
                WorkerEvent::JobCompleted { job_id: id, .. }
                    | WorkerEvent::JobFailed { job_id: id, .. } if *id == job_id
            );
            if finished {
                return event;
            }
        }
    })
    .await
    .expect("job did not finish in time")
}

#[tokio::test]
async fn test_create_update_and_read_history() {
    let mut h = harness(10);
    let user = User::new(Uuid::new_v4());
    let notebook = Uuid::new_v4();
    h.notebooks.grant_notebook(user.id, notebook);

    let note = h
        .service
        .add_note(user, notebook, "Diary", "hello")
        .await
        .unwrap();
    assert_eq!(
        h.service.note_content(user, notebook, note, None).await.unwrap(),
        b"hello\n"
    );

    let job = h
        .service
        .update_note(user, notebook, note, "hello world")
        .await
        .unwrap();
    let WorkerEvent::JobCompleted {
        diff_id: Some(diff_id),
        ..
    } = wait_for(&mut h.events, job).await
    else {
        panic!("update should record a diff");
    };

    assert_eq!(
        h.service.note_content(user, notebook, note, None).await.unwrap(),
        b"hello world\n"
    );
    assert_eq!(
        h.service
            .note_content(user, notebook, note, Some(diff_id))
            .await
            .unwrap(),
        b"hello\n"
    );

    h.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_fetch_notes_lists_only_the_notebook() {
    let h = harness(10);
    let user = User::new(Uuid::new_v4());
    let notebook = Uuid::new_v4();
    let other = Uuid::new_v4();
    h.notebooks.grant_notebook(user.id, notebook);
    h.notebooks.grant_notebook(user.id, other);

    let a = h.service.add_note(user, notebook, "A", "a").await.unwrap();
    let b = h.service.add_note(user, notebook, "B", "b").await.unwrap();
    h.service.add_note(user, other, "C", "c").await.unwrap();

    let notes = h.service.fetch_notes(user, notebook).await.unwrap();
    let ids: Vec<Uuid> = notes.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![a, b]);
    assert!(notes.iter().all(|n| n.path.ends_with(n.id.to_string())));

    h.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_strangers_are_forbidden() {
    let h = harness(10);
    let owner = User::new(Uuid::new_v4());
    let stranger = User::new(Uuid::new_v4());
    let notebook = Uuid::new_v4();
    h.notebooks.grant_notebook(owner.id, notebook);
    let note = h
        .service
        .add_note(owner, notebook, "Private", "secret")
        .await
        .unwrap();

    assert!(matches!(
        h.service.add_note(stranger, notebook, "Mine", "x").await,
        Err(Error::Forbidden(_))
    ));
    assert!(matches!(
        h.service.fetch_notes(stranger, notebook).await,
        Err(Error::Forbidden(_))
    ));
    assert!(matches!(
        h.service.update_note(stranger, notebook, note, "pwned").await,
        Err(Error::Forbidden(_))
    ));
    assert!(matches!(
        h.service.note_content(stranger, notebook, note, None).await,
        Err(Error::Forbidden(_))
    ));

    h.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_note_must_belong_to_the_notebook() {
    let h = harness(10);
    let user = User::new(Uuid::new_v4());
    let notebook = Uuid::new_v4();
    let other = Uuid::new_v4();
    h.notebooks.grant_notebook(user.id, notebook);
    h.notebooks.grant_notebook(user.id, other);
    let note = h.service.add_note(user, notebook, "N", "n").await.unwrap();

    assert!(matches!(
        h.service.update_note(user, other, note, "moved?").await,
        Err(Error::Forbidden(_))
    ));

    h.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_binary_content_is_rejected() {
    let h = harness(10);
    let user = User::new(Uuid::new_v4());
    let notebook = Uuid::new_v4();
    h.notebooks.grant_notebook(user.id, notebook);

    assert!(matches!(
        h.service.add_note(user, notebook, "Bin", "a\0b").await,
        Err(Error::InvalidInput(_))
    ));
    assert!(h.service.fetch_notes(user, notebook).await.unwrap().is_empty());

    let note = h.service.add_note(user, notebook, "Text", "ok").await.unwrap();
    assert!(matches!(
        h.service.update_note(user, notebook, note, "\0").await,
        Err(Error::InvalidInput(_))
    ));

    h.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_update_reports_saturation() {
    let dir = TempDir::new().unwrap();
    let store = ContentStore::new(dir.path());
    let diffs = Arc::new(InMemoryDiffRepository::new());
    let notebooks = Arc::new(InMemoryNotebooks::new());

    // Never started, so nothing drains the queue.
    let queue = UpdateQueue::new(
        store.clone(),
        diffs.clone(),
        Arc::new(SnapshotDiff),
        QueueConfig::default().with_capacity(1),
    );
    let reader = HistoryReader::new(store.clone(), diffs, Arc::new(SnapshotPatch));
    let service = NotesService::new(
        store,
        notebooks.clone(),
        notebooks.clone(),
        queue.submitter(),
        reader,
    );

    let user = User::new(Uuid::new_v4());
    let notebook = Uuid::new_v4();
    notebooks.grant_notebook(user.id, notebook);
    let note = service.add_note(user, notebook, "Busy", "v0").await.unwrap();

    service.update_note(user, notebook, note, "v1").await.unwrap();
    let err = service
        .update_note(user, notebook, note, "v2")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::QueueSaturated(1)));
    assert!(err.is_retryable());
}

/// Registry that refuses every insert.
struct RejectingRegistry;

#[async_trait]
impl NoteRegistry for RejectingRegistry {
    async fn add_note(&self, _: Uuid, _: Uuid, _: &str, _: &Path) -> Result<()> {
        Err(Error::Internal("registry unavailable".to_string()))
    }

    async fn notes_for_notebook(&self, _: Uuid) -> Result<Vec<NoteSummary>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_failed_registration_removes_content() {
    let dir = TempDir::new().unwrap();
    let store = ContentStore::new(dir.path());
    let diffs = Arc::new(InMemoryDiffRepository::new());
    let notebooks = Arc::new(InMemoryNotebooks::new());
    let queue = UpdateQueue::new(
        store.clone(),
        diffs.clone(),
        Arc::new(SnapshotDiff),
        QueueConfig::default(),
    );
    let reader = HistoryReader::new(store.clone(), diffs, Arc::new(SnapshotPatch));
    let service = NotesService::new(
        store,
        notebooks.clone(),
        Arc::new(RejectingRegistry),
        queue.submitter(),
        reader,
    );

    let user = User::new(Uuid::new_v4());
    let notebook = Uuid::new_v4();
    notebooks.grant_notebook(user.id, notebook);

    assert!(matches!(
        service.add_note(user, notebook, "Lost", "content").await,
        Err(Error::Internal(_))
    ));

    let mut entries = fs::read_dir(dir.path()).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}
