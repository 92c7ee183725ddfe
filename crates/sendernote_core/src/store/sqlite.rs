//! SQLite implementation of [`StorageAdapter`].
//!
//! # Responsibility
//! - Own one lazily-opened connection and reuse it for every call.
//! - Run caller-grouped work in one `BEGIN IMMEDIATE` transaction.
//! - Map rows to model types and back.
//!
//! # Invariants
//! - The connection is schema-upgraded before its first use.
//! - Multi-row writes (re-sequencing, bulk insert, import, clear) run in one
//!   transaction each, or join the caller's transaction when one is open.

use super::{StorageAdapter, StoreError, StoreResult};
use crate::db::{open_db, open_db_in_memory};
use crate::matching::rank_matches;
use crate::model::note::{MatchType, Note, NoteDraft, NoteId};
use crate::model::settings::{MigrationRecord, Settings, SETTINGS_RECORD_ID};
use crate::model::template::{Template, TemplateId};
use crate::timestamp::{now_after, now_iso};
use log::debug;
use once_cell::sync::OnceCell;
use rusqlite::{
    params, Connection, OptionalExtension, Params, Row, Transaction, TransactionBehavior,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const NOTE_SELECT_SQL: &str = "SELECT
    id,
    pattern,
    match_type,
    note,
    original_email,
    created_at,
    updated_at
FROM notes";

const TEMPLATE_SELECT_SQL: &str = "SELECT
    id,
    text,
    sort_order,
    created_at,
    updated_at
FROM templates";

const NOTE_UPSERT_SQL: &str = "INSERT INTO notes (
    id,
    pattern,
    match_type,
    note,
    original_email,
    created_at,
    updated_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT(id) DO UPDATE SET
    pattern = excluded.pattern,
    match_type = excluded.match_type,
    note = excluded.note,
    original_email = excluded.original_email,
    created_at = excluded.created_at,
    updated_at = excluded.updated_at;";

/// Where the adapter opens its database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbSource {
    File(PathBuf),
    Memory,
}

/// SQLite-backed storage adapter.
pub struct SqliteAdapter {
    source: DbSource,
    conn: OnceCell<Mutex<Connection>>,
}

impl SqliteAdapter {
    /// Creates an adapter; no I/O happens until the first operation.
    pub fn new(source: DbSource) -> Self {
        Self {
            source,
            conn: OnceCell::new(),
        }
    }

    pub fn open_file(path: impl Into<PathBuf>) -> Self {
        Self::new(DbSource::File(path.into()))
    }

    pub fn in_memory() -> Self {
        Self::new(DbSource::Memory)
    }

    /// Whether the underlying connection has been opened yet.
    pub fn is_open(&self) -> bool {
        self.conn.get().is_some()
    }

    fn lock_conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        let cell = self
            .conn
            .get_or_try_init(|| self.open_connection().map(Mutex::new))?;
        cell.lock().map_err(|_| StoreError::ConnectionPoisoned)
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let conn = match &self.source {
            DbSource::File(path) => open_db(path)?,
            DbSource::Memory => open_db_in_memory()?,
        };
        Ok(conn)
    }

    fn scoped<T>(&self, op: impl FnOnce(&ConnScope<'_>) -> StoreResult<T>) -> StoreResult<T> {
        let conn = self.lock_conn()?;
        op(&ConnScope { conn: &conn })
    }
}

impl StorageAdapter for SqliteAdapter {
    fn atomically(
        &self,
        work: &mut dyn FnMut(&dyn StorageAdapter) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let mut conn = self.lock_conn()?;
        // IMMEDIATE takes the write lock up front, so a second handle on the
        // same file waits in `busy_timeout` instead of reading stale rows.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        work(&ConnScope { conn: &tx })?;
        tx.commit()?;
        Ok(())
    }

    fn get_all_notes(&self) -> StoreResult<BTreeMap<NoteId, Note>> {
        self.scoped(|scope| scope.get_all_notes())
    }

    fn get_note_by_id(&self, id: NoteId) -> StoreResult<Option<Note>> {
        self.scoped(|scope| scope.get_note_by_id(id))
    }

    fn save_note(&self, draft: &NoteDraft) -> StoreResult<Note> {
        self.scoped(|scope| scope.save_note(draft))
    }

    fn delete_note(&self, id: NoteId) -> StoreResult<()> {
        self.scoped(|scope| scope.delete_note(id))
    }

    fn find_notes_by_email(&self, email: &str) -> StoreResult<Vec<Note>> {
        self.scoped(|scope| scope.find_notes_by_email(email))
    }

    fn find_duplicate(
        &self,
        pattern: &str,
        match_type: MatchType,
        exclude_id: Option<NoteId>,
    ) -> StoreResult<Option<Note>> {
        self.scoped(|scope| scope.find_duplicate(pattern, match_type, exclude_id))
    }

    fn import_notes(&self, notes: &[Note]) -> StoreResult<usize> {
        self.scoped(|scope| scope.import_notes(notes))
    }

    fn get_templates(&self) -> StoreResult<Vec<Template>> {
        self.scoped(|scope| scope.get_templates())
    }

    fn get_template_by_id(&self, id: TemplateId) -> StoreResult<Option<Template>> {
        self.scoped(|scope| scope.get_template_by_id(id))
    }

    fn add_template(&self, text: &str) -> StoreResult<Template> {
        self.scoped(|scope| scope.add_template(text))
    }

    fn add_templates(&self, texts: &[String]) -> StoreResult<Vec<Template>> {
        self.scoped(|scope| scope.add_templates(texts))
    }

    fn update_template(&self, id: TemplateId, text: &str) -> StoreResult<Option<Template>> {
        self.scoped(|scope| scope.update_template(id, text))
    }

    fn delete_template(&self, id: TemplateId) -> StoreResult<()> {
        self.scoped(|scope| scope.delete_template(id))
    }

    fn move_template(&self, id: TemplateId, after_id: Option<TemplateId>) -> StoreResult<()> {
        self.scoped(|scope| scope.move_template(id, after_id))
    }

    fn get_settings(&self) -> StoreResult<Settings> {
        self.scoped(|scope| scope.get_settings())
    }

    fn save_settings(&self, settings: &Settings) -> StoreResult<()> {
        self.scoped(|scope| scope.save_settings(settings))
    }

    fn clear_all(&self) -> StoreResult<()> {
        self.scoped(|scope| scope.clear_all())
    }

    fn get_applied_migrations(&self) -> StoreResult<Vec<MigrationRecord>> {
        self.scoped(|scope| scope.get_applied_migrations())
    }

    fn record_migration(&self, record: &MigrationRecord) -> StoreResult<()> {
        self.scoped(|scope| scope.record_migration(record))
    }

    fn remove_migration_record(&self, id: &str) -> StoreResult<()> {
        self.scoped(|scope| scope.remove_migration_record(id))
    }
}

/// Adapter view over one borrowed connection, which may already be inside a
/// transaction opened by [`SqliteAdapter::atomically`].
struct ConnScope<'c> {
    conn: &'c Connection,
}

impl ConnScope<'_> {
    /// Runs `op` in its own transaction, or inline when one is already open.
    fn in_transaction<T>(&self, op: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        if !self.conn.is_autocommit() {
            return op(self.conn);
        }
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let value = op(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

impl StorageAdapter for ConnScope<'_> {
    fn atomically(
        &self,
        work: &mut dyn FnMut(&dyn StorageAdapter) -> StoreResult<()>,
    ) -> StoreResult<()> {
        self.in_transaction(|conn| work(&ConnScope { conn }))
    }

    fn get_all_notes(&self) -> StoreResult<BTreeMap<NoteId, Note>> {
        let notes = query_notes(
            self.conn,
            &format!("{NOTE_SELECT_SQL} ORDER BY id ASC;"),
            params![],
        )?;
        Ok(notes.into_iter().map(|note| (note.id, note)).collect())
    }

    fn get_note_by_id(&self, id: NoteId) -> StoreResult<Option<Note>> {
        let mut notes = query_notes(self.conn, &format!("{NOTE_SELECT_SQL} WHERE id = ?1;"), [id])?;
        Ok(notes.pop())
    }

    fn save_note(&self, draft: &NoteDraft) -> StoreResult<Note> {
        let id = match draft.id {
            Some(id) => {
                upsert_note(self.conn, id, draft)?;
                id
            }
            None => {
                self.conn.execute(
                    "INSERT INTO notes (
                        pattern,
                        match_type,
                        note,
                        original_email,
                        created_at,
                        updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                    params![
                        draft.pattern.as_str(),
                        draft.match_type.as_str(),
                        draft.note.as_str(),
                        draft.original_email.as_str(),
                        draft.created_at.as_str(),
                        draft.updated_at.as_str(),
                    ],
                )?;
                self.conn.last_insert_rowid()
            }
        };

        Ok(draft.clone().into_note(id))
    }

    fn delete_note(&self, id: NoteId) -> StoreResult<()> {
        self.conn.execute("DELETE FROM notes WHERE id = ?1;", [id])?;
        Ok(())
    }

    fn find_notes_by_email(&self, email: &str) -> StoreResult<Vec<Note>> {
        let email_lower = email.to_lowercase();
        // Every match type implies the pattern is a substring of the address,
        // so SQLite prefilters and the shared ranking decides.
        let candidates = query_notes(
            self.conn,
            &format!("{NOTE_SELECT_SQL} WHERE pattern = '' OR instr(?1, pattern) > 0 ORDER BY id ASC;"),
            [email_lower.as_str()],
        )?;
        Ok(rank_matches(&email_lower, candidates))
    }

    fn find_duplicate(
        &self,
        pattern: &str,
        match_type: MatchType,
        exclude_id: Option<NoteId>,
    ) -> StoreResult<Option<Note>> {
        let mut notes = query_notes(
            self.conn,
            &format!(
                "{NOTE_SELECT_SQL}
                 WHERE pattern = ?1
                   AND match_type = ?2
                   AND (?3 IS NULL OR id <> ?3)
                 ORDER BY id ASC
                 LIMIT 1;"
            ),
            params![pattern, match_type.as_str(), exclude_id],
        )?;
        Ok(notes.pop())
    }

    fn import_notes(&self, notes: &[Note]) -> StoreResult<usize> {
        self.in_transaction(|conn| {
            for note in notes {
                upsert_note(conn, note.id, &NoteDraft::from(note.clone()))?;
            }
            Ok(notes.len())
        })
    }

    fn get_templates(&self) -> StoreResult<Vec<Template>> {
        load_templates(self.conn)
    }

    fn get_template_by_id(&self, id: TemplateId) -> StoreResult<Option<Template>> {
        load_template(self.conn, id)
    }

    fn add_template(&self, text: &str) -> StoreResult<Template> {
        let mut created = self.add_templates(&[text.to_string()])?;
        created
            .pop()
            .ok_or_else(|| StoreError::InvalidData("template insert returned no row".to_string()))
    }

    fn add_templates(&self, texts: &[String]) -> StoreResult<Vec<Template>> {
        self.in_transaction(|conn| {
            let max_order: Option<i64> =
                conn.query_row("SELECT MAX(sort_order) FROM templates;", [], |row| row.get(0))?;
            let mut next_order = max_order.map_or(0, |value| value + 1);
            let now = now_iso();
            let mut created = Vec::with_capacity(texts.len());

            for text in texts {
                let id = Uuid::new_v4();
                conn.execute(
                    "INSERT INTO templates (id, text, sort_order, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4);",
                    params![id.to_string(), text.as_str(), next_order, now.as_str()],
                )?;
                created.push(Template {
                    id: Some(id),
                    text: text.clone(),
                    order: next_order,
                    created_at: Some(now.clone()),
                    updated_at: Some(now.clone()),
                    is_default: false,
                });
                next_order += 1;
            }

            Ok(created)
        })
    }

    fn update_template(&self, id: TemplateId, text: &str) -> StoreResult<Option<Template>> {
        let Some(mut template) = load_template(self.conn, id)? else {
            return Ok(None);
        };

        let updated_at = now_after(template.updated_at.as_deref());
        self.conn.execute(
            "UPDATE templates SET text = ?1, updated_at = ?2 WHERE id = ?3;",
            params![text, updated_at.as_str(), id.to_string()],
        )?;

        template.text = text.to_string();
        template.updated_at = Some(updated_at);
        Ok(Some(template))
    }

    fn delete_template(&self, id: TemplateId) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM templates WHERE id = ?1;", [id.to_string()])?;
        Ok(())
    }

    fn move_template(&self, id: TemplateId, after_id: Option<TemplateId>) -> StoreResult<()> {
        self.in_transaction(|conn| {
            let mut templates = load_templates(conn)?;
            let Some(current_index) = templates.iter().position(|t| t.id == Some(id)) else {
                return Ok(());
            };
            let moved = templates.remove(current_index);

            let target_index = match after_id {
                None => 0,
                Some(after_id) => templates
                    .iter()
                    .position(|t| t.id == Some(after_id))
                    .map_or(templates.len(), |index| index + 1),
            };
            templates.insert(target_index, moved);

            let now = now_iso();
            for (order, template) in (0_i64..).zip(templates.iter()) {
                let Some(template_id) = template.id else {
                    continue;
                };
                conn.execute(
                    "UPDATE templates SET sort_order = ?1, updated_at = ?2 WHERE id = ?3;",
                    params![order, now.as_str(), template_id.to_string()],
                )?;
            }

            debug!(
                "event=template_move module=store status=ok from_index={current_index} to_index={target_index} total={}",
                templates.len()
            );
            Ok(())
        })
    }

    fn get_settings(&self) -> StoreResult<Settings> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT settings FROM settings WHERE id = ?1;",
                [SETTINGS_RECORD_ID],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Settings::new()),
        }
    }

    fn save_settings(&self, settings: &Settings) -> StoreResult<()> {
        let payload = serde_json::to_string(settings)?;
        self.conn.execute(
            "INSERT INTO settings (id, settings) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET settings = excluded.settings;",
            params![SETTINGS_RECORD_ID, payload],
        )?;
        Ok(())
    }

    fn clear_all(&self) -> StoreResult<()> {
        self.in_transaction(|conn| {
            conn.execute_batch(
                "DELETE FROM notes;
                 DELETE FROM templates;
                 DELETE FROM settings;",
            )?;
            Ok(())
        })
    }

    fn get_applied_migrations(&self) -> StoreResult<Vec<MigrationRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, applied_at FROM migrations ORDER BY applied_at ASC, id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(MigrationRecord {
                id: row.get("id")?,
                applied_at: row.get("applied_at")?,
            });
        }
        Ok(records)
    }

    fn record_migration(&self, record: &MigrationRecord) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO migrations (id, applied_at) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET applied_at = excluded.applied_at;",
            params![record.id.as_str(), record.applied_at.as_str()],
        )?;
        Ok(())
    }

    fn remove_migration_record(&self, id: &str) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM migrations WHERE id = ?1;", [id])?;
        Ok(())
    }
}

fn upsert_note(conn: &Connection, id: NoteId, draft: &NoteDraft) -> StoreResult<()> {
    conn.execute(
        NOTE_UPSERT_SQL,
        params![
            id,
            draft.pattern.as_str(),
            draft.match_type.as_str(),
            draft.note.as_str(),
            draft.original_email.as_str(),
            draft.created_at.as_str(),
            draft.updated_at.as_str(),
        ],
    )?;
    Ok(())
}

fn query_notes(conn: &Connection, sql: &str, params: impl Params) -> StoreResult<Vec<Note>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut notes = Vec::new();
    while let Some(row) = rows.next()? {
        notes.push(parse_note_row(row)?);
    }
    Ok(notes)
}

fn parse_note_row(row: &Row<'_>) -> StoreResult<Note> {
    let match_type_text: String = row.get("match_type")?;
    let match_type = MatchType::parse(&match_type_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid match type `{match_type_text}` in notes.match_type"
        ))
    })?;

    Ok(Note {
        id: row.get("id")?,
        pattern: row.get("pattern")?,
        match_type,
        note: row.get("note")?,
        original_email: row.get("original_email")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn load_templates(conn: &Connection) -> StoreResult<Vec<Template>> {
    let mut stmt = conn.prepare(&format!(
        "{TEMPLATE_SELECT_SQL} ORDER BY sort_order ASC, rowid ASC;"
    ))?;
    let mut rows = stmt.query([])?;
    let mut templates = Vec::new();
    while let Some(row) = rows.next()? {
        templates.push(parse_template_row(row)?);
    }
    Ok(templates)
}

fn load_template(conn: &Connection, id: TemplateId) -> StoreResult<Option<Template>> {
    let mut stmt = conn.prepare(&format!("{TEMPLATE_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_template_row(row)?)),
        None => Ok(None),
    }
}

fn parse_template_row(row: &Row<'_>) -> StoreResult<Template> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        StoreError::InvalidData(format!("invalid uuid value `{id_text}` in templates.id"))
    })?;

    Ok(Template {
        id: Some(id),
        text: row.get("text")?,
        order: row.get("sort_order")?,
        created_at: Some(row.get("created_at")?),
        updated_at: Some(row.get("updated_at")?),
        is_default: false,
    })
}
