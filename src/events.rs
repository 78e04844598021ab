//! Outbound event payloads.
//!
//! These structs define the JSON wire shapes for the two topics the worker
//! publishes to. Field names are part of the contract with downstream
//! consumers and must not drift.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::{CollectedArtefact, Source};

/// Topic for one event per newly inserted artefact.
pub const ARTEFACTS_TOPIC: &str = "collected_artefacts";
/// Topic for the per-run source summary.
pub const SOURCES_TOPIC: &str = "sources";

fn iso8601(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Event published to `collected_artefacts` for each newly inserted artefact,
/// keyed by the artefact identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtefactEvent {
    pub artefactid: String,
    pub sourcetype: String,
    pub description: String,
    pub sourceid: String,
    pub locator: String,
    /// Insertion timestamp, ISO-8601 UTC.
    pub created: String,
    pub articleelement: Option<Value>,
}

impl ArtefactEvent {
    pub fn new(artefact: &CollectedArtefact, source: &Source) -> Self {
        Self {
            artefactid: artefact.artefactid.clone(),
            sourcetype: source.sourcetype.clone(),
            description: artefact.description.clone(),
            sourceid: artefact.sourceid.clone(),
            locator: artefact.locator.clone(),
            created: iso8601(artefact.created),
            articleelement: source.articleelement.clone(),
        }
    }
}

/// One duplicate observation, accumulated per run and carried in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateArtefact {
    pub artefactid: String,
    pub description: String,
    pub sourceid: String,
    pub locator: String,
}

/// Event published to `sources` once per completed run, keyed by
/// `"{sourceid}_{YYYY-MM-DD}"` (UTC date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummaryEvent {
    pub sourceid: String,
    pub enabled: bool,
    pub sourcetype: String,
    pub sourcename: String,
    pub sourcelocation: String,
    pub articleelement: Option<Value>,
    pub lastinterrogation: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub numprocessed: i64,
    /// Run timestamp, ISO-8601 UTC.
    pub timestamp: String,
    /// Empty when the run saw no duplicates.
    pub duplicates: Vec<DuplicateArtefact>,
}

impl SourceSummaryEvent {
    /// Build the summary from the refreshed source attributes.
    pub fn new(source: &Source, timestamp: DateTime<Utc>, duplicates: Vec<DuplicateArtefact>) -> Self {
        Self {
            sourceid: source.sourceid.clone(),
            enabled: source.enabled,
            sourcetype: source.sourcetype.clone(),
            sourcename: source.sourcename.clone(),
            sourcelocation: source.sourcelocation.clone(),
            articleelement: source.articleelement.clone(),
            lastinterrogation: source.lastinterrogation.map(iso8601),
            created: source.created.map(iso8601),
            updated: source.updated.map(iso8601),
            numprocessed: source.numprocessed,
            timestamp: iso8601(timestamp),
            duplicates,
        }
    }
}

/// Key for the per-run summary event: source id plus the UTC calendar date,
/// so consumers can dedupe retried runs on the same day.
pub fn summary_key(sourceid: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}", sourceid, now.format("%Y-%m-%d"))
}
