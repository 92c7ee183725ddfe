//! Migrations shipped with the crate.

use super::Migration;
use crate::store::{StorageAdapter, StoreResult};

pub const BUILTIN_MIGRATIONS: &[Migration] = &[Migration {
    id: "001_backfill_original_email",
    description: "fill blank originalEmail from the note pattern",
    up: backfill_original_email,
    down: None,
}];

fn backfill_original_email(adapter: &dyn StorageAdapter) -> StoreResult<()> {
    let pending: Vec<_> = adapter
        .get_all_notes()?
        .into_values()
        .filter(|note| note.original_email.trim().is_empty())
        .map(|mut note| {
            note.original_email = note.pattern.clone();
            note
        })
        .collect();

    if !pending.is_empty() {
        adapter.import_notes(&pending)?;
    }
    Ok(())
}
