//! Core domain logic for SenderNote.
//! Per-sender notes, reply templates and settings over a local SQLite store.

pub mod api;
pub mod db;
pub mod defaults;
pub mod logging;
pub mod matching;
pub mod migration;
pub mod model;
pub mod repository;
pub mod store;
pub mod timestamp;

pub use api::{dispatch, dispatch_json, ApiError, Request, Response};
pub use logging::{init_logging, logging_status, LogLevel, LoggingError};
pub use migration::{Migration, MigrationReport, MigrationRunner, RevertOutcome};
pub use model::note::{MatchType, Note, NoteId, SaveNoteInput};
pub use model::settings::Settings;
pub use model::template::{Template, TemplateId, TemplateKey};
pub use repository::{DuplicateCheck, ImportSummary, NotesRepository, SaveOutcome};
pub use store::{DbSource, SqliteAdapter, StorageAdapter, StoreError, StoreResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
