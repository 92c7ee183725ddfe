//! Notes repository: the business-logic entry point over a storage adapter.
//!
//! # Responsibility
//! - Normalize patterns, reject duplicate `(pattern, match_type)` triggers and
//!   own note timestamps.
//! - Resolve sender matches by priority.
//! - Synthesize and materialize default templates.
//! - Read-modify-write single settings values.
//!
//! # Invariants
//! - The repository is the only writer; adapters stay pure CRUD.
//! - Read-check-write sequences run in one adapter transaction, so they hold
//!   across every handle on the same database.
//! - Mutating a missing note/template id is a successful no-op.
//! - Storage faults propagate unchanged; nothing is retried.
//!
//! Pattern-vs-email sanity checks before a save are the caller's job; the
//! repository trusts that patterns were validated against their sender.

mod templates;

use crate::matching::{normalize_pattern, validate_pattern};
use crate::model::note::{MatchType, Note, NoteDraft, NoteId, SaveNoteInput};
use crate::model::settings::Settings;
use crate::store::{StorageAdapter, StoreError, StoreResult};
use crate::timestamp::now_after;
use log::{debug, info};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Human-readable reason attached to duplicate rejections.
pub const DUPLICATE_MESSAGE: &str = "A note with this exact pattern and match type already exists.";

/// Supplies default template texts while no template is persisted.
pub type DefaultTemplatesProvider = Box<dyn Fn() -> Vec<String> + Send + Sync>;

/// Result of a note save. Duplicates are a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { note_id: NoteId },
    Duplicate { existing_note_id: NoteId },
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// Answer to a duplicate pre-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCheck {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_id: Option<NoteId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<Note>,
}

/// Counts from a bulk note import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: usize,
    /// Rows dropped because their trigger was already taken.
    pub skipped_duplicates: usize,
}

/// Business-logic facade over a [`StorageAdapter`].
pub struct NotesRepository<A: StorageAdapter> {
    adapter: A,
    default_templates: Option<DefaultTemplatesProvider>,
}

impl<A: StorageAdapter> NotesRepository<A> {
    /// Creates a repository without default templates.
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            default_templates: None,
        }
    }

    /// Installs the default template provider.
    pub fn with_default_templates(
        mut self,
        provider: impl Fn() -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.set_default_templates_provider(provider);
        self
    }

    pub fn set_default_templates_provider(
        &mut self,
        provider: impl Fn() -> Vec<String> + Send + Sync + 'static,
    ) {
        self.default_templates = Some(Box::new(provider));
    }

    /// Underlying adapter, e.g. for the migration runner.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Runs `work` in one adapter transaction and hands back its result.
    ///
    /// `work` must only touch the store it is given; calling `self.adapter`
    /// from inside would wait on the transaction it is part of.
    fn in_transaction<T>(
        &self,
        mut work: impl FnMut(&dyn StorageAdapter) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut result = None;
        self.adapter
            .atomically(&mut |store: &dyn StorageAdapter| -> StoreResult<()> {
                result = Some(work(store)?);
                Ok(())
            })?;
        result.ok_or_else(|| {
            StoreError::InvalidData("transaction committed without running its work".to_string())
        })
    }

    // --- Notes ---

    pub fn get_all_notes(&self) -> StoreResult<BTreeMap<NoteId, Note>> {
        self.adapter.get_all_notes()
    }

    pub fn get_note_by_id(&self, id: NoteId) -> StoreResult<Option<Note>> {
        self.adapter.get_note_by_id(id)
    }

    /// Creates or updates a note.
    ///
    /// - The pattern is stored lowercase.
    /// - Another note with the same `(pattern, match_type)` rejects the save
    ///   without writing anything.
    /// - Updating keeps `created_at`, and keeps `original_email` unless a
    ///   non-blank one is supplied; `updated_at` always moves forward.
    /// - An `id` naming no stored note creates a fresh note with a new id.
    pub fn save_note(&self, input: SaveNoteInput) -> StoreResult<SaveOutcome> {
        let pattern = normalize_pattern(&input.pattern);
        let (outcome, is_update) =
            self.in_transaction(|store| save_in(store, &input, &pattern))?;

        match outcome {
            SaveOutcome::Saved { note_id } => info!(
                "event=note_save module=repository status=ok note_id={note_id} match_type={} update={is_update}",
                input.match_type
            ),
            SaveOutcome::Duplicate { existing_note_id } => info!(
                "event=note_duplicate_rejected module=repository status=ok match_type={} existing_note_id={existing_note_id}",
                input.match_type
            ),
        }
        Ok(outcome)
    }

    /// Deletes a note; a missing id is a no-op.
    pub fn delete_note(&self, id: NoteId) -> StoreResult<()> {
        self.adapter.delete_note(id)
    }

    /// Deletes the highest-priority note matching `email`, if any.
    pub fn delete_note_by_email(&self, email: &str) -> StoreResult<()> {
        let deleted = self.in_transaction(|store| {
            let Some(note) = store.find_notes_by_email(email)?.into_iter().next() else {
                return Ok(None);
            };
            store.delete_note(note.id)?;
            Ok(Some(note.id))
        })?;

        if let Some(note_id) = deleted {
            debug!("event=note_delete module=repository status=ok note_id={note_id}");
        }
        Ok(())
    }

    /// Every note triggered by `email`, exact matches first, then
    /// startsWith, endsWith and contains.
    pub fn find_notes_by_email(&self, email: &str) -> StoreResult<Vec<Note>> {
        self.adapter.find_notes_by_email(email)
    }

    /// Highest-priority note triggered by `email`.
    pub fn find_note_by_email(&self, email: &str) -> StoreResult<Option<Note>> {
        Ok(self.find_notes_by_email(email)?.into_iter().next())
    }

    pub fn check_duplicate(
        &self,
        pattern: &str,
        match_type: MatchType,
        exclude_id: Option<NoteId>,
    ) -> StoreResult<DuplicateCheck> {
        let duplicate =
            self.adapter
                .find_duplicate(&normalize_pattern(pattern), match_type, exclude_id)?;
        Ok(DuplicateCheck {
            exists: duplicate.is_some(),
            note_id: duplicate.as_ref().map(|note| note.id),
            note: duplicate,
        })
    }

    pub fn validate_pattern(&self, email: &str, pattern: &str, match_type: MatchType) -> bool {
        validate_pattern(email, pattern, match_type)
    }

    /// Restores notes with their ids, lowercasing patterns and dropping rows
    /// whose trigger is already used by another note.
    pub fn import_notes(&self, notes: Vec<Note>) -> StoreResult<ImportSummary> {
        let summary = self.in_transaction(|store| {
            let mut seen = HashSet::new();
            let mut accepted = Vec::with_capacity(notes.len());
            let mut skipped_duplicates = 0;

            for note in &notes {
                let mut note = note.clone();
                note.pattern = normalize_pattern(&note.pattern);
                let taken = !seen.insert((note.pattern.clone(), note.match_type))
                    || store
                        .find_duplicate(&note.pattern, note.match_type, Some(note.id))?
                        .is_some();
                if taken {
                    skipped_duplicates += 1;
                    continue;
                }
                accepted.push(note);
            }

            Ok(ImportSummary {
                imported: store.import_notes(&accepted)?,
                skipped_duplicates,
            })
        })?;

        info!(
            "event=note_import module=repository status=ok imported={} skipped_duplicates={}",
            summary.imported, summary.skipped_duplicates
        );
        Ok(summary)
    }

    /// Removes all notes, templates and settings.
    pub fn clear_all(&self) -> StoreResult<()> {
        self.adapter.clear_all()?;
        info!("event=store_clear module=repository status=ok");
        Ok(())
    }

    // --- Settings ---

    pub fn get_settings(&self) -> StoreResult<Settings> {
        self.adapter.get_settings()
    }

    pub fn save_settings(&self, settings: &Settings) -> StoreResult<()> {
        self.adapter.save_settings(settings)
    }

    /// Value stored under `key`, or `default` when the key is absent.
    pub fn get_setting(&self, key: &str, default: Value) -> StoreResult<Value> {
        Ok(self.get_settings()?.get(key).cloned().unwrap_or(default))
    }

    /// Read-modify-write of the whole settings record (last writer wins).
    pub fn set_setting(&self, key: &str, value: Value) -> StoreResult<()> {
        self.in_transaction(|store| {
            let mut settings = store.get_settings()?;
            settings.insert(key.to_string(), value.clone());
            store.save_settings(&settings)
        })
    }
}

/// Duplicate check, existing-row read and write of one save. Returns the
/// outcome and whether an existing note was overwritten.
fn save_in(
    store: &dyn StorageAdapter,
    input: &SaveNoteInput,
    pattern: &str,
) -> StoreResult<(SaveOutcome, bool)> {
    if let Some(duplicate) = store.find_duplicate(pattern, input.match_type, input.id)? {
        let outcome = SaveOutcome::Duplicate {
            existing_note_id: duplicate.id,
        };
        return Ok((outcome, false));
    }

    let existing = match input.id {
        Some(id) => store.get_note_by_id(id)?,
        None => None,
    };

    let updated_at = now_after(existing.as_ref().map(|note| note.updated_at.as_str()));
    let original_email = match input
        .original_email
        .as_deref()
        .filter(|email| !email.trim().is_empty())
    {
        Some(email) => email.to_string(),
        None => existing
            .as_ref()
            .map(|note| note.original_email.clone())
            .filter(|email| !email.is_empty())
            .unwrap_or_else(|| pattern.to_string()),
    };
    let is_update = existing.is_some();

    let draft = NoteDraft {
        id: existing.as_ref().map(|note| note.id),
        pattern: pattern.to_string(),
        match_type: input.match_type,
        note: input.note.clone(),
        original_email,
        created_at: existing
            .map(|note| note.created_at)
            .unwrap_or_else(|| updated_at.clone()),
        updated_at,
    };

    let saved = store.save_note(&draft)?;
    Ok((SaveOutcome::Saved { note_id: saved.id }, is_update))
}
