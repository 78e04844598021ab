use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{
    ArtefactRow, ArtefactStore, CollectedArtefact, InsertOutcome, Source, StoreError,
};

impl Database {
    /// Attempt to persist an artefact, reporting a duplicate identifier as an
    /// outcome rather than an error.
    ///
    /// This is a plain INSERT: the duplicate is detected by the primary-key
    /// uniqueness violation at the storage layer, never by a prior existence
    /// check, so two concurrent runs racing on the same entry cannot both
    /// observe "absent" and both insert.
    pub async fn insert_artefact_if_absent(
        &self,
        artefact: &CollectedArtefact,
    ) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO collected_artefacts (artefactid, description, sourceid, locator, created)
            VALUES (?, ?, ?, ?, ?)
        "#,
        )
        .bind(&artefact.artefactid)
        .bind(&artefact.description)
        .bind(&artefact.sourceid)
        .bind(&artefact.locator)
        .bind(artefact.created)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Fetch one artefact by identifier.
    pub async fn get_artefact(
        &self,
        artefactid: &str,
    ) -> Result<Option<CollectedArtefact>, StoreError> {
        let row: Option<ArtefactRow> = sqlx::query_as(
            r#"
            SELECT artefactid, description, sourceid, locator, created
            FROM collected_artefacts
            WHERE artefactid = ?
        "#,
        )
        .bind(artefactid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ArtefactRow::into_artefact))
    }

    /// Count artefacts collected for a source.
    pub async fn count_artefacts_for_source(&self, sourceid: &str) -> Result<i64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM collected_artefacts WHERE sourceid = ?")
                .bind(sourceid)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

// The pipeline consumes the store through this trait so tests can substitute
// fault-injecting wrappers. Each call is its own autocommit statement; a
// failure in one entry's insert cannot roll back previously committed rows.
#[async_trait]
impl ArtefactStore for Database {
    async fn get_source(&self, sourceid: &str) -> Result<Source, StoreError> {
        Database::get_source(self, sourceid).await
    }

    async fn insert_artefact_if_absent(
        &self,
        artefact: &CollectedArtefact,
    ) -> Result<InsertOutcome, StoreError> {
        Database::insert_artefact_if_absent(self, artefact).await
    }

    async fn update_run_stats(
        &self,
        sourceid: &str,
        processed: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Database::update_run_stats(self, sourceid, processed, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn test_artefact(id: &str) -> CollectedArtefact {
        CollectedArtefact {
            artefactid: id.to_string(),
            description: "rss from Example - Title".to_string(),
            sourceid: "s1".to_string(),
            locator: "https://example.com/post".to_string(),
            created: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_then_duplicate() {
        let db = test_db().await;
        let artefact = test_artefact("a1");

        let first = db.insert_artefact_if_absent(&artefact).await.unwrap();
        assert_eq!(first, InsertOutcome::Inserted);

        let second = db.insert_artefact_if_absent(&artefact).await.unwrap();
        assert_eq!(second, InsertOutcome::Duplicate);

        // The original row is untouched by the duplicate attempt.
        let stored = db.get_artefact("a1").await.unwrap().unwrap();
        assert_eq!(stored.description, "rss from Example - Title");
        assert_eq!(db.count_artefacts_for_source("s1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_distinct_ids_both_insert() {
        let db = test_db().await;

        let a = db.insert_artefact_if_absent(&test_artefact("a1")).await.unwrap();
        let b = db.insert_artefact_if_absent(&test_artefact("a2")).await.unwrap();
        assert_eq!(a, InsertOutcome::Inserted);
        assert_eq!(b, InsertOutcome::Inserted);
        assert_eq!(db.count_artefacts_for_source("s1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_get_artefact_missing() {
        let db = test_db().await;
        assert!(db.get_artefact("nope").await.unwrap().is_none());
    }
}
