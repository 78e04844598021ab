use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Store-level errors as seen by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No source row exists for the requested id. Fatal for the run.
    #[error("No source found with sourceid {0}")]
    NotFound(String),

    /// More than one source row matched the requested id. Structurally
    /// impossible under the primary key, but surfaced rather than guessed at.
    #[error("Multiple sources found with sourceid {0}")]
    Ambiguous(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// ============================================================================
// Insert Classification
// ============================================================================

/// Outcome of an atomic insert-if-absent attempt.
///
/// `Duplicate` is a classification, not a failure: the artefact identifier
/// already exists, which is exactly what deduplication is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

// ============================================================================
// Data Structures
// ============================================================================

/// A configured feed to poll, provisioned externally.
///
/// `numprocessed` and `lastinterrogation` reflect only the most recent run;
/// they are overwritten, never accumulated.
#[derive(Debug, Clone)]
pub struct Source {
    pub sourceid: String,
    pub enabled: bool,
    pub sourcetype: String,
    pub sourcename: String,
    pub sourcelocation: String,
    /// Opaque structured metadata, passed through to events unmodified.
    pub articleelement: Option<Value>,
    pub lastinterrogation: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub numprocessed: i64,
}

/// One deduplicated feed entry, created on first observation and never
/// updated or deleted by this system.
#[derive(Debug, Clone)]
pub struct CollectedArtefact {
    /// Content-derived identifier (see `identity::derive_artefact_id`).
    pub artefactid: String,
    /// Synthesized summary: "{sourcetype} from {sourcename} - {title}".
    pub description: String,
    pub sourceid: String,
    /// The entry's canonical link.
    pub locator: String,
    pub created: DateTime<Utc>,
}

/// Internal row type for Source queries (used by sqlx FromRow).
/// Converts to Source via into_source(), unwrapping the JSON column.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SourceRow {
    pub sourceid: String,
    pub enabled: bool,
    pub sourcetype: String,
    pub sourcename: String,
    pub sourcelocation: String,
    pub articleelement: Option<Json<Value>>,
    pub lastinterrogation: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub numprocessed: i64,
}

impl SourceRow {
    pub(crate) fn into_source(self) -> Source {
        Source {
            sourceid: self.sourceid,
            enabled: self.enabled,
            sourcetype: self.sourcetype,
            sourcename: self.sourcename,
            sourcelocation: self.sourcelocation,
            articleelement: self.articleelement.map(|j| j.0),
            lastinterrogation: self.lastinterrogation,
            created: self.created,
            updated: self.updated,
            numprocessed: self.numprocessed,
        }
    }
}

/// Internal row type for artefact queries (used by sqlx FromRow).
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArtefactRow {
    pub artefactid: String,
    pub description: String,
    pub sourceid: String,
    pub locator: String,
    pub created: DateTime<Utc>,
}

impl ArtefactRow {
    pub(crate) fn into_artefact(self) -> CollectedArtefact {
        CollectedArtefact {
            artefactid: self.artefactid,
            description: self.description,
            sourceid: self.sourceid,
            locator: self.locator,
            created: self.created,
        }
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// The persistence boundary consumed by the ingestion pipeline.
///
/// `Database` is the production implementation; the trait exists so tests can
/// wrap it and inject faults (a single entry's storage failure must not stop
/// the rest of the run, which is hard to exercise against a healthy SQLite).
#[async_trait]
pub trait ArtefactStore: Send + Sync {
    /// Fetch the source row driving this run.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if no row matches, `StoreError::Ambiguous` if
    /// more than one does. Both are fatal to the run.
    async fn get_source(&self, sourceid: &str) -> Result<Source, StoreError>;

    /// Atomically persist an artefact unless its identifier already exists.
    ///
    /// Duplicate detection happens at the storage layer (uniqueness
    /// violation), never as a separate existence check, so concurrent runs
    /// cannot both win the insert.
    async fn insert_artefact_if_absent(
        &self,
        artefact: &CollectedArtefact,
    ) -> Result<InsertOutcome, StoreError>;

    /// Overwrite the source's processed count and last-interrogation time.
    /// Idempotent when re-run with the same values.
    async fn update_run_stats(
        &self,
        sourceid: &str,
        processed: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
