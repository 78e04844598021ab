//! Single-source feed-ingestion worker.
//!
//! Given one configured source (an RSS/Atom feed), a run fetches the feed,
//! deduplicates entries against SQLite via a content-derived identifier,
//! records new entries as collected artefacts, and publishes per-artefact and
//! per-run summary events to NATS.
//!
//! The interesting part is the [`pipeline`]: the algorithm that turns a
//! parsed feed into a deterministic, idempotent set of storage writes and
//! outbound events, with per-entry failure isolation within a single run.

pub mod bus;
pub mod config;
pub mod events;
pub mod feed;
pub mod identity;
pub mod pipeline;
pub mod storage;
