//! PostgreSQL repository for note diff metadata.
//!
//! Diff ids are random UUIDv4 values and carry no ordering, so each row also
//! gets a `BIGSERIAL` sequence number; listing orders by it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use bongo_core::{DiffRecord, DiffRepository, Error, Result};

/// PostgreSQL implementation of [`DiffRepository`] backed by the `note_diff` table.
#[derive(Clone)]
pub struct PgDiffRepository {
    pool: PgPool,
}

impl PgDiffRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DiffRepository for PgDiffRepository {
    async fn record_diff(&self, note_id: Uuid, diff_id: Uuid) -> Result<()> {
        sqlx::query("INSERT INTO note_diff (id, note_id, created_at) VALUES ($1, $2, $3)")
            .bind(diff_id)
            .bind(note_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(db_table = "note_diff", note_id = %note_id, diff_id = %diff_id, "Recorded diff");
        Ok(())
    }

    async fn list_records(&self, note_id: Uuid) -> Result<Vec<DiffRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, note_id, created_at
            FROM note_diff
            WHERE note_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(note_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                Ok(DiffRecord {
                    id: row.try_get::<Uuid, _>("id")?,
                    note_id: row.try_get::<Uuid, _>("note_id")?,
                    created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(Error::Database)
    }
}
