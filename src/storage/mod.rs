mod artefacts;
mod schema;
mod sources;
mod types;

pub use schema::Database;
pub use types::{ArtefactStore, CollectedArtefact, InsertOutcome, Source, StoreError};
