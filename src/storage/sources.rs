use chrono::{DateTime, Utc};
use sqlx::types::Json;

use super::schema::Database;
use super::types::{Source, SourceRow, StoreError};

impl Database {
    /// Fetch the source row for a run.
    ///
    /// Fetches every matching row rather than trusting the primary key, so an
    /// ambiguous result surfaces as `StoreError::Ambiguous` instead of an
    /// arbitrary pick.
    pub async fn get_source(&self, sourceid: &str) -> Result<Source, StoreError> {
        let mut rows: Vec<SourceRow> = sqlx::query_as(
            r#"
            SELECT sourceid, enabled, sourcetype, sourcename, sourcelocation,
                   articleelement, lastinterrogation, created, updated, numprocessed
            FROM sources
            WHERE sourceid = ?
        "#,
        )
        .bind(sourceid)
        .fetch_all(&self.pool)
        .await?;

        match rows.len() {
            0 => Err(StoreError::NotFound(sourceid.to_string())),
            1 => Ok(rows.remove(0).into_source()),
            _ => Err(StoreError::Ambiguous(sourceid.to_string())),
        }
    }

    /// Insert or replace a source row (INSERT ... ON CONFLICT DO UPDATE).
    ///
    /// Provisioning is an external concern; this exists for operator tooling
    /// and tests, not for the pipeline, which never creates sources.
    pub async fn upsert_source(&self, source: &Source) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sources (sourceid, enabled, sourcetype, sourcename, sourcelocation,
                                 articleelement, lastinterrogation, created, updated, numprocessed)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(sourceid) DO UPDATE SET
                enabled = excluded.enabled,
                sourcetype = excluded.sourcetype,
                sourcename = excluded.sourcename,
                sourcelocation = excluded.sourcelocation,
                articleelement = excluded.articleelement,
                updated = excluded.updated
        "#,
        )
        .bind(&source.sourceid)
        .bind(source.enabled)
        .bind(&source.sourcetype)
        .bind(&source.sourcename)
        .bind(&source.sourcelocation)
        .bind(source.articleelement.clone().map(Json))
        .bind(source.lastinterrogation)
        .bind(source.created)
        .bind(source.updated)
        .bind(source.numprocessed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Overwrite the source's run statistics.
    ///
    /// `processed` counts only the entries newly inserted this run — not
    /// cumulative, not including duplicates. Re-running with the same values
    /// is a no-op beyond rewriting them.
    pub async fn update_run_stats(
        &self,
        sourceid: &str,
        processed: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE sources SET numprocessed = ?, lastinterrogation = ? WHERE sourceid = ?")
            .bind(processed)
            .bind(now)
            .bind(sourceid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
