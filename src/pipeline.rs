//! The deduplication-and-publish pipeline.
//!
//! One run is a short, linear state machine:
//!
//! `LOAD_SOURCE → CHECK_ENABLED → FETCH_FEED → [PROCESS_ENTRY]* →
//!  UPDATE_STATS → PUBLISH_SUMMARY → DONE`
//!
//! Entries are processed sequentially in feed order. Per-entry outcomes are
//! absorbed into the run's counters and duplicates list; only source lookup
//! and feed retrieval failures abort a run. The caller (the binary) decides
//! what the typed result means for the process exit status.

use chrono::Utc;
use thiserror::Error;

use crate::bus::{publish_json, EventPublisher};
use crate::events::{
    summary_key, ArtefactEvent, DuplicateArtefact, SourceSummaryEvent, ARTEFACTS_TOPIC,
    SOURCES_TOPIC,
};
use crate::feed::{fetch_feed, FeedEntry, FetchError, FetchLimits};
use crate::identity::derive_artefact_id;
use crate::storage::{ArtefactStore, CollectedArtefact, Source, StoreError};

/// Fatal, run-aborting conditions.
///
/// Everything else (duplicates, single-entry storage failures, bus publish
/// failures) is absorbed into the run report.
#[derive(Debug, Error)]
pub enum RunError {
    /// No source row exists for the configured id
    #[error("No source found with sourceid {0}")]
    SourceNotFound(String),
    /// Source lookup matched more than one row
    #[error("Multiple sources found with sourceid {0}")]
    AmbiguousSource(String),
    /// Feed could not be retrieved or parsed
    #[error("Feed fetch failed: {0}")]
    Fetch(#[from] FetchError),
    /// Store failure outside the per-entry insert path
    #[error(transparent)]
    Store(StoreError),
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The source is disabled; nothing was touched.
    Disabled,
    /// The feed had zero entries; stats and summary were deliberately left
    /// alone (prior run statistics are preserved, not zeroed).
    EmptyFeed,
    /// The run went end to end.
    Completed(RunReport),
}

/// Per-run counters and the accumulated duplicates list.
#[derive(Debug)]
pub struct RunReport {
    /// Entries newly inserted this run. This is what lands in `numprocessed`.
    pub inserted: i64,
    /// Entries whose identifier already existed in storage.
    pub duplicates: Vec<DuplicateArtefact>,
    /// Entries skipped due to a storage failure (logged, not counted
    /// anywhere else).
    pub failed: usize,
}

/// The ingestion pipeline, with its collaborators handed in at construction.
pub struct Pipeline<S: ArtefactStore, P: EventPublisher> {
    store: S,
    publisher: P,
    client: reqwest::Client,
    limits: FetchLimits,
}

impl<S: ArtefactStore, P: EventPublisher> Pipeline<S, P> {
    pub fn new(store: S, publisher: P, client: reqwest::Client, limits: FetchLimits) -> Self {
        Self {
            store,
            publisher,
            client,
            limits,
        }
    }

    /// Execute one run for `sourceid`.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] only for fatal conditions: unknown or ambiguous
    /// source, unreachable/unparseable feed, or a store failure outside the
    /// per-entry insert path. A disabled source and an empty feed are clean
    /// outcomes, not errors.
    pub async fn run(&self, sourceid: &str) -> Result<RunOutcome, RunError> {
        let mut source = self.store.get_source(sourceid).await.map_err(|e| match e {
            StoreError::NotFound(id) => RunError::SourceNotFound(id),
            StoreError::Ambiguous(id) => RunError::AmbiguousSource(id),
            other => RunError::Store(other),
        })?;

        if !source.enabled {
            tracing::info!(sourceid = %source.sourceid, "Source is disabled, skipping run");
            return Ok(RunOutcome::Disabled);
        }

        let entries = fetch_feed(&self.client, &source.sourcelocation, self.limits).await?;

        if entries.is_empty() {
            // Deliberate asymmetry, preserved from the source behavior: an
            // empty feed leaves numprocessed/lastinterrogation at their prior
            // values and publishes no summary.
            tracing::warn!(
                feed = %source.sourcelocation,
                "No entries found in the feed"
            );
            return Ok(RunOutcome::EmptyFeed);
        }

        let report = self.process_entries(&source, &entries).await;

        // Stats reflect only this run's newly inserted entries.
        let now = Utc::now();
        self.store
            .update_run_stats(&source.sourceid, report.inserted, now)
            .await
            .map_err(RunError::Store)?;
        source.numprocessed = report.inserted;
        source.lastinterrogation = Some(now);

        let key = summary_key(&source.sourceid, now);
        let summary = SourceSummaryEvent::new(&source, now, report.duplicates.clone());
        match publish_json(&self.publisher, SOURCES_TOPIC, &key, &summary).await {
            Ok(()) => {
                tracing::info!(topic = SOURCES_TOPIC, key = %key, "Run summary published");
            }
            Err(e) => {
                // Best-effort: the store is the source of truth, the event is
                // a notification.
                tracing::warn!(topic = SOURCES_TOPIC, key = %key, error = %e, "Summary publish failed");
            }
        }

        tracing::info!(
            sourceid = %source.sourceid,
            inserted = report.inserted,
            duplicates = report.duplicates.len(),
            failed = report.failed,
            "Run complete"
        );

        Ok(RunOutcome::Completed(report))
    }

    /// Classify each entry as Inserted, Duplicate, or StorageFailure.
    ///
    /// One entry's failure never prevents later entries from being attempted.
    async fn process_entries(&self, source: &Source, entries: &[FeedEntry]) -> RunReport {
        let mut inserted: i64 = 0;
        let mut duplicates = Vec::new();
        let mut failed = 0;

        for entry in entries {
            let artefactid = derive_artefact_id(
                &entry.title,
                &entry.link,
                &entry.description,
                &entry.published,
            );
            let description = format!(
                "{} from {} - {}",
                source.sourcetype, source.sourcename, entry.title
            );

            let artefact = CollectedArtefact {
                artefactid,
                description,
                sourceid: source.sourceid.clone(),
                locator: entry.link.clone(),
                created: Utc::now(),
            };

            match self.store.insert_artefact_if_absent(&artefact).await {
                Ok(crate::storage::InsertOutcome::Inserted) => {
                    inserted += 1;

                    let event = ArtefactEvent::new(&artefact, source);
                    match publish_json(
                        &self.publisher,
                        ARTEFACTS_TOPIC,
                        &artefact.artefactid,
                        &event,
                    )
                    .await
                    {
                        Ok(()) => {
                            tracing::info!(
                                topic = ARTEFACTS_TOPIC,
                                artefactid = %artefact.artefactid,
                                "Artefact event published"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(
                                topic = ARTEFACTS_TOPIC,
                                artefactid = %artefact.artefactid,
                                error = %e,
                                "Artefact event publish failed, row remains committed"
                            );
                        }
                    }
                }
                Ok(crate::storage::InsertOutcome::Duplicate) => {
                    tracing::warn!(
                        artefactid = %artefact.artefactid,
                        description = %artefact.description,
                        sourceid = %artefact.sourceid,
                        locator = %artefact.locator,
                        "Duplicate entry detected"
                    );
                    duplicates.push(DuplicateArtefact {
                        artefactid: artefact.artefactid,
                        description: artefact.description,
                        sourceid: artefact.sourceid,
                        locator: artefact.locator,
                    });
                }
                Err(e) => {
                    tracing::error!(
                        artefactid = %artefact.artefactid,
                        error = %e,
                        "Storage failure, skipping entry"
                    );
                    failed += 1;
                }
            }
        }

        RunReport {
            inserted,
            duplicates,
            failed,
        }
    }
}
