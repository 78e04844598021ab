use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StoreError;

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Migration` if schema creation fails and
    /// `StoreError::Database` for connection-level errors.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to release
        // before returning SQLITE_BUSY. Concurrent runs (a retried run for the
        // same source, or runs for different sources sharing one database)
        // contend on the writer lock, so transient contention resolves itself.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StoreError::Database)?
            .pragma("busy_timeout", "5000");
        // SQLite is single-writer; a run is sequential so a small pool covers
        // the occasional overlapping invocation.
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;
        let db = Self { pool };
        db.migrate()
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All schema changes are wrapped in a single transaction so a failure
    /// mid-migration leaves the database in its previous consistent state.
    /// Every statement uses `IF NOT EXISTS`, so re-running is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Source configuration rows, keyed by the externally assigned id.
        // Timestamps are RFC 3339 TEXT (chrono's sqlx encoding); articleelement
        // is opaque JSON text passed through to events unmodified.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                sourceid TEXT PRIMARY KEY,
                enabled INTEGER NOT NULL,
                sourcetype TEXT NOT NULL,
                sourcename TEXT NOT NULL,
                sourcelocation TEXT NOT NULL,
                articleelement TEXT,
                lastinterrogation TEXT,
                created TEXT,
                updated TEXT,
                numprocessed INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Deduplicated feed entries. The PRIMARY KEY on artefactid is the
        // uniqueness constraint the whole dedup design hangs on: a second
        // insert of the same identifier fails with a unique violation, which
        // the store reports as a Duplicate outcome.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collected_artefacts (
                artefactid TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                sourceid TEXT NOT NULL,
                locator TEXT NOT NULL,
                created TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_artefacts_source ON collected_artefacts(sourceid)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
