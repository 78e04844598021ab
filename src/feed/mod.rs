//! Feed retrieval and parsing.
//!
//! The pipeline treats the feed as an external collaborator: this module's
//! only job is to turn a configured URL into an ordered list of entries, with
//! bounded requests and best-effort retries.
//!
//! - [`parser`] - Low-level feed parsing using the `feed-rs` crate
//! - [`fetcher`] - HTTP fetching with timeout, backoff, and size limits

mod fetcher;
mod parser;

pub use fetcher::{fetch_feed, FetchError, FetchLimits};
pub use parser::{parse_feed, FeedEntry};
