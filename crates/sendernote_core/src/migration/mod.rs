//! Data migration registry and runner.
//!
//! # Responsibility
//! - Hold data-shape migrations in declaration order.
//! - Apply the ones not yet recorded in the `migrations` store.
//!
//! # Invariants
//! - A migration's `up` step and its record commit in one transaction; a
//!   failing step leaves neither behind.
//! - The first failure stops the run; earlier successes stay applied.
//! - Structural changes (stores, indexes) belong to `db::schema`, never here.

mod builtin;

pub use builtin::BUILTIN_MIGRATIONS;

use crate::model::settings::MigrationRecord;
use crate::store::{StorageAdapter, StoreError, StoreResult};
use crate::timestamp::now_iso;
use log::{error, info, warn};
use std::collections::HashSet;
use std::fmt::{Debug, Formatter};

/// Migration step over the storage adapter.
pub type MigrationFn = fn(&dyn StorageAdapter) -> StoreResult<()>;

/// One data migration. `id` must be unique and sort in declaration order
/// (`NNN_description`).
#[derive(Clone, Copy)]
pub struct Migration {
    pub id: &'static str,
    pub description: &'static str,
    pub up: MigrationFn,
    pub down: Option<MigrationFn>,
}

impl Debug for Migration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("reversible", &self.down.is_some())
            .finish()
    }
}

/// Migration whose `up` step failed.
#[derive(Debug)]
pub struct MigrationFailure {
    pub id: String,
    pub error: StoreError,
}

/// Outcome of one `run_pending` call.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Applied by this run, in order.
    pub applied: Vec<String>,
    /// Already recorded before this run.
    pub skipped: Vec<String>,
    /// Not attempted because an earlier migration failed.
    pub blocked: Vec<String>,
    pub failed: Option<MigrationFailure>,
}

impl MigrationReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_none()
    }
}

/// Outcome of `revert_last`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertOutcome {
    Reverted(String),
    /// Latest applied migration declares no `down` step.
    Irreversible(String),
    NothingApplied,
}

/// Ordered migration runner.
#[derive(Debug, Clone)]
pub struct MigrationRunner {
    migrations: Vec<Migration>,
}

impl MigrationRunner {
    pub fn new(migrations: Vec<Migration>) -> Self {
        Self { migrations }
    }

    /// Runner over the migrations shipped with this crate.
    pub fn builtin() -> Self {
        Self::new(BUILTIN_MIGRATIONS.to_vec())
    }

    /// Applies every registered migration not yet recorded.
    ///
    /// # Errors
    /// Returns a storage error only when the applied set cannot be read.
    /// Failures of individual migrations are reported in the
    /// [`MigrationReport`]; the host decides whether to proceed unmigrated.
    pub fn run_pending(&self, adapter: &dyn StorageAdapter) -> StoreResult<MigrationReport> {
        let applied: HashSet<String> = adapter
            .get_applied_migrations()?
            .into_iter()
            .map(|record| record.id)
            .collect();

        let mut report = MigrationReport::default();
        for migration in &self.migrations {
            if applied.contains(migration.id) {
                report.skipped.push(migration.id.to_string());
                continue;
            }
            if report.failed.is_some() {
                report.blocked.push(migration.id.to_string());
                continue;
            }

            match apply_one(adapter, migration) {
                Ok(()) => report.applied.push(migration.id.to_string()),
                Err(err) => {
                    error!(
                        "event=migration_apply module=migration status=error id={} error={err}",
                        migration.id
                    );
                    report.failed = Some(MigrationFailure {
                        id: migration.id.to_string(),
                        error: err,
                    });
                }
            }
        }

        info!(
            "event=migration_run module=migration status={} applied={} skipped={} blocked={}",
            if report.is_success() { "ok" } else { "error" },
            report.applied.len(),
            report.skipped.len(),
            report.blocked.len()
        );
        Ok(report)
    }

    /// Runs `down` for the most recently applied registered migration and
    /// forgets its record.
    pub fn revert_last(&self, adapter: &dyn StorageAdapter) -> StoreResult<RevertOutcome> {
        let applied = adapter.get_applied_migrations()?;
        let latest = applied.iter().rev().find_map(|record| {
            self.migrations
                .iter()
                .find(|migration| migration.id == record.id)
        });

        let Some(migration) = latest else {
            return Ok(RevertOutcome::NothingApplied);
        };
        let Some(down) = migration.down else {
            warn!(
                "event=migration_revert module=migration status=skipped id={} reason=no_down_step",
                migration.id
            );
            return Ok(RevertOutcome::Irreversible(migration.id.to_string()));
        };

        adapter.atomically(&mut |store: &dyn StorageAdapter| -> StoreResult<()> {
            down(store)?;
            store.remove_migration_record(migration.id)
        })?;
        info!(
            "event=migration_revert module=migration status=ok id={}",
            migration.id
        );
        Ok(RevertOutcome::Reverted(migration.id.to_string()))
    }
}

fn apply_one(adapter: &dyn StorageAdapter, migration: &Migration) -> StoreResult<()> {
    adapter.atomically(&mut |store: &dyn StorageAdapter| -> StoreResult<()> {
        (migration.up)(store)?;
        store.record_migration(&MigrationRecord {
            id: migration.id.to_string(),
            applied_at: now_iso(),
        })
    })?;
    info!(
        "event=migration_apply module=migration status=ok id={}",
        migration.id
    );
    Ok(())
}
