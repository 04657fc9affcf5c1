//! bongo-notes: operator tool for the note version-history pipeline.
//!
//! Validates the environment, then creates, updates and inspects notes
//! directly against the content store and the diff metadata database.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use bongo_core::defaults::{DATABASE_URL, NOTES_ROOT};
use bongo_core::{DiffRepository, Error};
use bongo_db::{ContentStore, Database, PoolConfig};
use bongo_jobs::{HistoryReader, QueueConfig, ToolConfig, UpdateQueue, WorkerEvent};

/// Default age after which staged content is pruned.
const STAGING_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// How often `serve` prunes the staging directory.
const PRUNE_INTERVAL_SECS: u64 = 60 * 60;

#[derive(Parser)]
#[command(name = "bongo-notes")]
#[command(author, version, about = "Version history for bongo-notes")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the diff/patch tools and the notes root
    Check,

    /// Create a note from a file and print its id
    Create {
        /// File holding the initial content
        file: PathBuf,
    },

    /// Replace a note's content with a file, recording a diff
    Update {
        /// Note to update
        note_id: Uuid,

        /// File holding the new content
        file: PathBuf,
    },

    /// Print a note's current or historical content
    Show {
        /// Note to print
        note_id: Uuid,

        /// Print the content as it was before this diff
        #[arg(long)]
        at: Option<Uuid>,
    },

    /// List a note's diffs, oldest first
    History {
        /// Note to inspect
        note_id: Uuid,
    },

    /// Delete staged content older than the given age
    Prune {
        /// Minimum age in seconds
        #[arg(long, default_value_t = STAGING_MAX_AGE_SECS)]
        older_than_secs: u64,
    },

    /// Prune staged content hourly until SIGINT/SIGTERM
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let _log_guard = init_tracing();

    // Missing tools or an unusable notes root abort startup.
    let tools = ToolConfig::from_env().resolve()?;
    let notes_root = std::env::var("NOTES_ROOT").unwrap_or_else(|_| NOTES_ROOT.to_string());
    let store = ContentStore::new(&notes_root);
    store
        .validate()
        .await
        .map_err(|e| anyhow!("notes root {} is unusable: {}", notes_root, e))?;
    info!(notes_root = %notes_root, "Content store ready");

    match cli.command {
        Commands::Check => {
            println!(
                "ok: diff={} patch={} notes_root={}",
                tools.diff_bin.to_string_lossy(),
                tools.patch_bin.to_string_lossy(),
                notes_root
            );
        }
        Commands::Create { file } => cmd_create(&store, &file).await?,
        Commands::Update { note_id, file } => {
            let db = connect().await?;
            cmd_update(&store, &db, &tools, note_id, &file).await?;
        }
        Commands::Show { note_id, at } => {
            let db = connect().await?;
            let reader = HistoryReader::new(store, Arc::new(db.diffs), Arc::new(tools.patch()));
            let content = match at {
                Some(diff_id) => reader.at_diff(note_id, diff_id).await?,
                None => reader.current(note_id).await?,
            };
            std::io::stdout().lock().write_all(&content)?;
        }
        Commands::History { note_id } => {
            let db = connect().await?;
            for record in db.diffs.list_records(note_id).await? {
                println!("{}\t{}", record.id, record.created_at.to_rfc3339());
            }
        }
        Commands::Prune { older_than_secs } => {
            let removed = store
                .prune_staging(Duration::from_secs(older_than_secs))
                .await?;
            println!("removed {} staged file(s)", removed);
        }
        Commands::Serve => cmd_serve(store).await?,
    }

    Ok(())
}

// Initialize tracing with configurable output
//
// Environment variables:
//   LOG_FORMAT  - "json" or "text" (default: "text")
//   LOG_FILE    - path to log file (optional, enables file logging)
//   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
//   RUST_LOG    - standard env filter (default: "bongo_notes=info,bongo_jobs=info,bongo_db=info")
fn init_tracing() -> Option<WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bongo_notes=info,bongo_jobs=info,bongo_db=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let guard = if let Some(ref path) = log_file {
        let file_dir = Path::new(path).parent().unwrap_or(Path::new("."));
        let file_name = Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("bongo-notes.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            // no ANSI in files unless asked for
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console output goes to stderr so `show` can pipe content cleanly.
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );
    guard
}

async fn connect() -> anyhow::Result<Database> {
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DATABASE_URL.to_string());
    info!("Connecting to database...");
    let db = Database::connect(&database_url, PoolConfig::from_env())
        .await
        .context("connecting to the diff metadata database")?;

    // Run pending database migrations on startup
    db.migrate().await?;
    info!("Database ready");
    Ok(db)
}

async fn read_note_file(file: &Path) -> anyhow::Result<Vec<u8>> {
    let content = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    if content.contains(&0) {
        bail!("{} is not a plain-text file", file.display());
    }
    Ok(content)
}

async fn cmd_create(store: &ContentStore, file: &Path) -> anyhow::Result<()> {
    let content = read_note_file(file).await?;
    let note_id = Uuid::new_v4();
    store.initialize(note_id, &content).await?;
    println!("{}", note_id);
    Ok(())
}

async fn cmd_update(
    store: &ContentStore,
    db: &Database,
    tools: &ToolConfig,
    note_id: Uuid,
    file: &Path,
) -> anyhow::Result<()> {
    let content = read_note_file(file).await?;
    if !store.has_current(note_id).await? {
        return Err(Error::NoteNotFound(note_id)).context("use `create` first");
    }

    let queue = UpdateQueue::new(
        store.clone(),
        Arc::new(db.diffs.clone()),
        Arc::new(tools.diff()),
        QueueConfig::from_env(),
    );
    let mut events = queue.events();
    let handle = queue
        .start()
        .context("another bongo-notes process is updating this notes root")?;

    let staged = store.stage(&content).await?;
    let job_id = handle.submitter().submit(note_id, staged)?;

    let outcome = loop {
        match events.recv().await {
            Ok(WorkerEvent::JobCompleted {
                job_id: id,
                diff_id,
                ..
            }) if id == job_id => break Ok(diff_id),
            Ok(WorkerEvent::JobFailed { job_id: id, error, .. }) if id == job_id => {
                break Err(anyhow!("update failed: {}", error))
            }
            Ok(_) => {}
            Err(e) => break Err(anyhow!("lost worker events: {}", e)),
        }
    };
    handle.shutdown().await?;

    match outcome? {
        Some(diff_id) => println!("{}", diff_id),
        None => println!("unchanged"),
    }
    Ok(())
}

/// Staging maintenance loop. Updates run in `update`, which owns the worker lock
/// for its duration; this process never mutates notes.
async fn cmd_serve(store: ContentStore) -> anyhow::Result<()> {
    let mut prune = tokio::time::interval(Duration::from_secs(PRUNE_INTERVAL_SECS));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    info!(interval_secs = PRUNE_INTERVAL_SECS, "Staging maintenance started");
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = prune.tick() => {
                if let Err(e) = store.prune_staging(Duration::from_secs(STAGING_MAX_AGE_SECS)).await {
                    warn!(error = %e, "Staging prune failed");
                }
            }
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
            }
            _ => {
                warn!("Signal handlers unavailable; falling back to Ctrl+C");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
