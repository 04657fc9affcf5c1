//! Update queue and its single worker.
//!
//! Every content update for every note goes through one bounded channel and is
//! processed by exactly one worker task, so promotions are totally ordered and
//! no two jobs ever touch the content store concurrently. The worker holds the
//! store's [`WorkerLock`](bongo_db::WorkerLock) while it runs, which keeps a
//! second process from starting its own worker on the same notes root.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::fs;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use bongo_core::defaults::{EVENT_BUS_CAPACITY, PARTIAL_EXTENSION, UPDATE_QUEUE_CAPACITY};
use bongo_core::{DiffOutcome, DiffProvider, DiffRepository, Error, Result, UpdateJob};
use bongo_db::ContentStore;

/// Configuration for the update queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of jobs waiting for the worker.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: UPDATE_QUEUE_CAPACITY,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `UPDATE_QUEUE_CAPACITY` | `10` | Pending jobs before `QueueSaturated` |
    pub fn from_env() -> Self {
        let capacity = std::env::var("UPDATE_QUEUE_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(UPDATE_QUEUE_CAPACITY)
            .max(1);
        Self { capacity }
    }

    /// Set the queue capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

/// Event emitted by the update worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Worker started.
    WorkerStarted,
    /// A job was dequeued and is being processed.
    JobStarted { job_id: Uuid, note_id: Uuid },
    /// A job promoted its content. `diff_id` is `None` when nothing changed
    /// or the job established a note's baseline.
    JobCompleted {
        job_id: Uuid,
        note_id: Uuid,
        diff_id: Option<Uuid>,
    },
    /// A job failed and was dropped.
    JobFailed {
        job_id: Uuid,
        note_id: Uuid,
        error: String,
    },
    /// Worker stopped.
    WorkerStopped,
}

/// Cloneable, non-blocking handle for enqueueing update jobs.
#[derive(Clone)]
pub struct JobSubmitter {
    job_tx: mpsc::Sender<UpdateJob>,
    capacity: usize,
}

impl JobSubmitter {
    /// Enqueue an update of `note_id` to the staged content at `staged_path`.
    ///
    /// Never blocks: a full queue fails with [`Error::QueueSaturated`] and a
    /// stopped worker with [`Error::QueueClosed`].
    pub fn submit(&self, note_id: Uuid, staged_path: impl Into<PathBuf>) -> Result<Uuid> {
        let job = UpdateJob::new(note_id, staged_path);
        let job_id = job.id;
        match self.job_tx.try_send(job) {
            Ok(()) => {
                debug!(job_id = %job_id, note_id = %note_id, "Queued update job");
                Ok(job_id)
            }
            Err(TrySendError::Full(_)) => {
                warn!(note_id = %note_id, capacity = self.capacity, "Update queue saturated");
                Err(Error::QueueSaturated(self.capacity))
            }
            Err(TrySendError::Closed(_)) => Err(Error::QueueClosed),
        }
    }

    /// Number of jobs waiting for the worker.
    pub fn pending(&self) -> usize {
        self.capacity - self.job_tx.capacity()
    }
}

/// Handle for controlling a running worker.
///
/// Dropping the handle without calling [`QueueHandle::shutdown`] also stops the
/// worker after its in-flight job.
pub struct QueueHandle {
    shutdown_tx: mpsc::Sender<()>,
    done_rx: oneshot::Receiver<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    submitter: JobSubmitter,
}

impl QueueHandle {
    /// Signal the worker to stop and wait until it has.
    ///
    /// The job being processed when the signal arrives always completes; jobs
    /// still queued behind it are dropped and reported as failed.
    pub async fn shutdown(self) -> Result<()> {
        // A closed channel means the worker is already gone; the done signal covers both.
        let _ = self.shutdown_tx.send(()).await;
        self.done_rx
            .await
            .map_err(|_| Error::Internal("update worker exited without signalling".into()))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }

    pub fn submitter(&self) -> JobSubmitter {
        self.submitter.clone()
    }
}

/// Owned update pipeline: queue, worker state and collaborators.
pub struct UpdateQueue {
    store: ContentStore,
    diffs: Arc<dyn DiffRepository>,
    differ: Arc<dyn DiffProvider>,
    config: QueueConfig,
    job_tx: mpsc::Sender<UpdateJob>,
    job_rx: mpsc::Receiver<UpdateJob>,
    event_tx: broadcast::Sender<WorkerEvent>,
    history_lock: Arc<RwLock<()>>,
}

impl UpdateQueue {
    /// Create a queue. Jobs may be submitted before [`UpdateQueue::start`].
    pub fn new(
        store: ContentStore,
        diffs: Arc<dyn DiffRepository>,
        differ: Arc<dyn DiffProvider>,
        config: QueueConfig,
    ) -> Self {
        let (job_tx, job_rx) = mpsc::channel(config.capacity);
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            store,
            diffs,
            differ,
            config,
            job_tx,
            job_rx,
            event_tx,
            history_lock: Arc::new(RwLock::new(())),
        }
    }

    pub fn submitter(&self) -> JobSubmitter {
        JobSubmitter {
            job_tx: self.job_tx.clone(),
            capacity: self.config.capacity,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Lock held by the worker while it records a diff and promotes content.
    ///
    /// Share it with a [`HistoryReader`](crate::HistoryReader) so reconstruction
    /// snapshots a consistent (chain, current) pair.
    pub fn history_lock(&self) -> Arc<RwLock<()>> {
        self.history_lock.clone()
    }

    /// Start the worker and return a handle for control.
    ///
    /// Fails with [`Error::WorkerActive`] when another worker already owns the
    /// notes root. Queued jobs stay queued in that case and are dropped with the queue.
    pub fn start(self) -> Result<QueueHandle> {
        let worker_lock = self.store.lock_worker()?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = oneshot::channel();
        let event_rx = self.event_tx.subscribe();
        let submitter = self.submitter();

        tokio::spawn(async move {
            self.run(shutdown_rx).await;
            drop(worker_lock);
            let _ = done_tx.send(());
        });

        Ok(QueueHandle {
            shutdown_tx,
            done_rx,
            event_rx,
            submitter,
        })
    }

    /// Drain the queue until shutdown is signalled.
    ///
    /// Shutdown is only observed between jobs; a dequeued job always runs to
    /// completion.
    #[instrument(skip_all, fields(differ = self.differ.name()))]
    async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(capacity = self.config.capacity, "Update worker started");
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Update worker received shutdown signal");
                    break;
                }
                job = self.job_rx.recv() => match job {
                    Some(job) => self.execute_job(job).await,
                    None => break,
                },
            }
        }

        self.job_rx.close();
        while let Ok(job) = self.job_rx.try_recv() {
            warn!(
                job_id = %job.id,
                note_id = %job.note_id,
                staged = %job.staged_path.display(),
                "Dropping queued update job at shutdown"
            );
            let _ = self.event_tx.send(WorkerEvent::JobFailed {
                job_id: job.id,
                note_id: job.note_id,
                error: "worker stopped before the job ran".to_string(),
            });
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Update worker stopped");
    }

    async fn execute_job(&self, job: UpdateJob) {
        let start = Instant::now();
        let job_id = job.id;
        let note_id = job.note_id;

        let _ = self
            .event_tx
            .send(WorkerEvent::JobStarted { job_id, note_id });

        match self.process(&job).await {
            Ok(diff_id) => {
                info!(
                    job_id = %job_id,
                    note_id = %note_id,
                    diff_id = ?diff_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Update job completed"
                );
                let _ = self.event_tx.send(WorkerEvent::JobCompleted {
                    job_id,
                    note_id,
                    diff_id,
                });
            }
            Err(e) => {
                warn!(
                    job_id = %job_id,
                    note_id = %note_id,
                    staged = %job.staged_path.display(),
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Update job failed; staged content left in place"
                );
                let _ = self.event_tx.send(WorkerEvent::JobFailed {
                    job_id,
                    note_id,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Diff, record and promote one job. Returns the recorded diff id, if any.
    async fn process(&self, job: &UpdateJob) -> Result<Option<Uuid>> {
        let note_id = job.note_id;
        if !fs::try_exists(&job.staged_path).await? {
            return Err(Error::ContentMissing(format!(
                "no staged content at {}",
                job.staged_path.display()
            )));
        }

        let current = self.store.current_path(note_id);
        if !fs::try_exists(&current).await? {
            let _guard = self.history_lock.write().await;
            self.store.establish(note_id, &job.staged_path).await?;
            return Ok(None);
        }

        fs::create_dir_all(self.store.diff_dir(note_id)).await?;
        let diff_id = Uuid::new_v4();
        let artifact = self.store.diff_path(note_id, diff_id);
        let partial = artifact.with_extension(PARTIAL_EXTENSION);

        let outcome = self
            .differ
            .diff(&current, &job.staged_path, &partial)
            .await?;

        let _guard = self.history_lock.write().await;
        let recorded = match outcome {
            DiffOutcome::Identical => {
                debug!(note_id = %note_id, "No changes; promoting without a diff");
                None
            }
            DiffOutcome::Changed { payload_len } => {
                fs::rename(&partial, &artifact).await?;
                if let Err(e) = self.diffs.record_diff(note_id, diff_id).await {
                    let _ = fs::remove_file(&artifact).await;
                    return Err(e);
                }
                debug!(note_id = %note_id, diff_id = %diff_id, bytes = payload_len, "Stored diff artifact");
                Some(diff_id)
            }
        };

        if let Err(e) = self.store.promote(note_id, &job.staged_path).await {
            if recorded.is_some() {
                error!(
                    note_id = %note_id,
                    diff_id = %diff_id,
                    error = %e,
                    "Diff recorded but promotion failed; history no longer ends at current content"
                );
            }
            return Err(e);
        }

        Ok(recorded)
    }
}
