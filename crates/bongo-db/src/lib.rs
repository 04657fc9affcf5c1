//! # bongo-db
//!
//! Storage layer for the bongo-notes version-history pipeline.
//!
//! This crate provides:
//! - The filesystem [`ContentStore`] (current content, diff artifacts, staging)
//! - A PostgreSQL [`DiffRepository`](bongo_core::DiffRepository) implementation
//! - In-memory repository implementations for tests
//! - Connection pool management
//! - The [`WorkerLock`] reserving a notes root for one update worker
//!
//! ## Example
//!
//! ```rust,ignore
//! use bongo_db::{ContentStore, Database, PoolConfig};
//!
//! let store = ContentStore::new("/var/lib/bongo/notes");
//! let note_dir = store.initialize(note_id, b"hello\n").await?;
//! let staged = store.stage(b"hello world\n").await?;
//!
//! let db = Database::connect("postgres://localhost/bongo_notes", PoolConfig::default()).await?;
//! let history = db.diffs.list_diffs(note_id).await?;
//! ```

pub mod content_store;
pub mod diffs;
pub mod memory;
pub mod pool;
pub mod worker_lock;

pub use content_store::{content_hash, normalize_line_break, ContentStore};
pub use diffs::PgDiffRepository;
pub use memory::{InMemoryDiffRepository, InMemoryNotebooks};
pub use pool::{create_pool, PoolConfig};
pub use worker_lock::WorkerLock;

use bongo_core::Result;

/// Combined database context.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Diff metadata repository.
    pub diffs: PgDiffRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            diffs: PgDiffRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| bongo_core::Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }
}
