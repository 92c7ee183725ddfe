//! Storage adapter contract and persistence implementations.
//!
//! # Responsibility
//! - Define the persistence-technology-agnostic CRUD contract over notes,
//!   templates, settings and migration records.
//! - Keep SQL details behind that contract.
//!
//! # Invariants
//! - Adapters never apply defaulting, validation or duplicate blocking;
//!   `find_duplicate` is a pure lookup.
//! - Deleting a missing id is not an error.
//! - Read-check-write sequences go through `atomically`, never through
//!   separate autocommit calls.
//! - Reads reject corrupt persisted rows instead of masking them.

use crate::db::DbError;
use crate::model::note::{MatchType, Note, NoteDraft, NoteId};
use crate::model::settings::{MigrationRecord, Settings};
use crate::model::template::{Template, TemplateId};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod sqlite;

pub use sqlite::{DbSource, SqliteAdapter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage fault surfaced by adapter operations.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    Json(serde_json::Error),
    InvalidData(String),
    ConnectionPoisoned,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "invalid JSON payload: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::ConnectionPoisoned => write!(f, "database connection lock poisoned"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::InvalidData(_) | Self::ConnectionPoisoned => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Persistence contract behind the notes repository.
///
/// Object safe so migrations can receive `&dyn StorageAdapter`.
pub trait StorageAdapter {
    /// Runs `work` inside one storage transaction. Every call `work` makes on
    /// the adapter it receives commits together, and nothing commits when
    /// `work` fails. Other handles on the same database wait until it ends.
    fn atomically(
        &self,
        work: &mut dyn FnMut(&dyn StorageAdapter) -> StoreResult<()>,
    ) -> StoreResult<()>;

    // --- Notes ---

    /// All notes keyed by id, in storage iteration order.
    fn get_all_notes(&self) -> StoreResult<BTreeMap<NoteId, Note>>;
    fn get_note_by_id(&self, id: NoteId) -> StoreResult<Option<Note>>;
    /// Inserts when `draft.id` is `None`, otherwise overwrites that row.
    fn save_note(&self, draft: &NoteDraft) -> StoreResult<Note>;
    fn delete_note(&self, id: NoteId) -> StoreResult<()>;
    /// Notes triggered by `email`, ordered by match-type priority.
    fn find_notes_by_email(&self, email: &str) -> StoreResult<Vec<Note>>;
    /// First note stored under exactly `(pattern, match_type)`, skipping `exclude_id`.
    fn find_duplicate(
        &self,
        pattern: &str,
        match_type: MatchType,
        exclude_id: Option<NoteId>,
    ) -> StoreResult<Option<Note>>;
    /// Writes notes with their ids preserved, in one transaction.
    fn import_notes(&self, notes: &[Note]) -> StoreResult<usize>;

    // --- Templates ---

    /// All templates by ascending `order`, ties in insertion order.
    fn get_templates(&self) -> StoreResult<Vec<Template>>;
    fn get_template_by_id(&self, id: TemplateId) -> StoreResult<Option<Template>>;
    /// Appends one template after the current maximum order.
    fn add_template(&self, text: &str) -> StoreResult<Template>;
    /// Appends templates in the given sequence, in one transaction.
    fn add_templates(&self, texts: &[String]) -> StoreResult<Vec<Template>>;
    /// Returns `None` when `id` does not exist.
    fn update_template(&self, id: TemplateId, text: &str) -> StoreResult<Option<Template>>;
    fn delete_template(&self, id: TemplateId) -> StoreResult<()>;
    /// Places `id` right after `after_id` (first when `None`, last when
    /// `after_id` is unknown) and re-sequences every order to `0..n-1`.
    fn move_template(&self, id: TemplateId, after_id: Option<TemplateId>) -> StoreResult<()>;

    // --- Settings ---

    fn get_settings(&self) -> StoreResult<Settings>;
    fn save_settings(&self, settings: &Settings) -> StoreResult<()>;

    // --- Maintenance ---

    /// Removes notes, templates and settings. Migration history is kept.
    fn clear_all(&self) -> StoreResult<()>;
    fn get_applied_migrations(&self) -> StoreResult<Vec<MigrationRecord>>;
    fn record_migration(&self, record: &MigrationRecord) -> StoreResult<()>;
    fn remove_migration_record(&self, id: &str) -> StoreResult<()>;
}
