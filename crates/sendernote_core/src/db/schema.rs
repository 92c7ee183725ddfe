//! Declarative storage layout and versioned upgrade executor.
//!
//! # Responsibility
//! - Describe every schema version as data: stores, their key and indexes,
//!   plus index modifications on stores that already exist.
//! - Upgrade a connection from its recorded version to the latest in one pass.
//!
//! # Invariants
//! - Versions are declared in strictly increasing order.
//! - Re-applying a version whose stores/indexes already exist is a no-op.
//! - The whole upgrade runs in one transaction; a failure leaves neither new
//!   stores nor a bumped `user_version` behind.
//! - Schema code only creates/drops stores and indexes, never row content.

use crate::db::{DbError, DbResult};
use log::{debug, error, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// One non-key column of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    /// SQLite type plus column constraints, e.g. `TEXT NOT NULL`.
    pub sql_type: &'static str,
}

/// Secondary index over one or more columns of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDef {
    /// Logical name, unique per store. Physical name is `<store>_<name>`.
    pub name: &'static str,
    pub key_path: &'static [&'static str],
    pub unique: bool,
}

/// Logical store (one SQLite table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreDef {
    pub name: &'static str,
    pub key_path: &'static str,
    /// Integer keys generated on insert and never reused; otherwise text keys.
    pub auto_increment: bool,
    pub columns: &'static [ColumnDef],
    pub indexes: &'static [IndexDef],
}

/// Index change applied to a store created by an earlier version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modification {
    AddIndex {
        store: &'static str,
        index: IndexDef,
    },
    DropIndex {
        store: &'static str,
        name: &'static str,
    },
}

/// Changes applied when upgrading *to* `version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaVersion {
    pub version: u32,
    pub description: &'static str,
    pub stores: &'static [StoreDef],
    pub modifications: &'static [Modification],
}

/// Version range crossed by one upgrade call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaUpgrade {
    pub from: u32,
    pub to: u32,
}

impl SchemaUpgrade {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

const CREATED_AT: ColumnDef = ColumnDef {
    name: "created_at",
    sql_type: "TEXT NOT NULL",
};

const UPDATED_AT: ColumnDef = ColumnDef {
    name: "updated_at",
    sql_type: "TEXT NOT NULL",
};

const MIGRATIONS_STORE: StoreDef = StoreDef {
    name: "migrations",
    key_path: "id",
    auto_increment: false,
    columns: &[ColumnDef {
        name: "applied_at",
        sql_type: "TEXT NOT NULL",
    }],
    indexes: &[IndexDef {
        name: "applied_at",
        key_path: &["applied_at"],
        unique: false,
    }],
};

const NOTES_STORE: StoreDef = StoreDef {
    name: "notes",
    key_path: "id",
    auto_increment: true,
    columns: &[
        ColumnDef {
            name: "pattern",
            sql_type: "TEXT NOT NULL",
        },
        ColumnDef {
            name: "match_type",
            sql_type: "TEXT NOT NULL",
        },
        ColumnDef {
            name: "note",
            sql_type: "TEXT NOT NULL",
        },
        ColumnDef {
            name: "original_email",
            sql_type: "TEXT NOT NULL DEFAULT ''",
        },
        CREATED_AT,
        UPDATED_AT,
    ],
    indexes: &[
        IndexDef {
            name: "pattern",
            key_path: &["pattern"],
            unique: false,
        },
        IndexDef {
            name: "match_type",
            key_path: &["match_type"],
            unique: false,
        },
        IndexDef {
            name: "pattern_match_type",
            key_path: &["pattern", "match_type"],
            unique: false,
        },
    ],
};

const TEMPLATES_STORE: StoreDef = StoreDef {
    name: "templates",
    key_path: "id",
    auto_increment: false,
    columns: &[
        ColumnDef {
            name: "text",
            sql_type: "TEXT NOT NULL",
        },
        ColumnDef {
            name: "sort_order",
            sql_type: "INTEGER NOT NULL DEFAULT 0",
        },
        CREATED_AT,
        UPDATED_AT,
    ],
    indexes: &[IndexDef {
        name: "sort_order",
        key_path: &["sort_order"],
        unique: false,
    }],
};

const SETTINGS_STORE: StoreDef = StoreDef {
    name: "settings",
    key_path: "id",
    auto_increment: false,
    columns: &[ColumnDef {
        name: "settings",
        sql_type: "TEXT NOT NULL",
    }],
    indexes: &[],
};

/// Every schema version known by this binary, oldest first.
pub const SCHEMA: &[SchemaVersion] = &[
    SchemaVersion {
        version: 1,
        description: "initial stores: migrations, notes, templates, settings",
        stores: &[MIGRATIONS_STORE, NOTES_STORE, TEMPLATES_STORE, SETTINGS_STORE],
        modifications: &[],
    },
    SchemaVersion {
        version: 2,
        description: "drop notes.pattern index covered by pattern_match_type",
        stores: &[],
        modifications: &[Modification::DropIndex {
            store: "notes",
            name: "pattern",
        }],
    },
];

/// Returns the latest schema version known by this binary.
pub fn latest_version() -> u32 {
    latest_version_of(SCHEMA)
}

/// Upgrades the connection to [`SCHEMA`]'s latest version.
pub fn apply_schema(conn: &mut Connection) -> DbResult<SchemaUpgrade> {
    upgrade(conn, SCHEMA)
}

/// Upgrades the connection through every declared version newer than its
/// current `user_version`, atomically.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the database is newer than `versions`.
/// - `InvalidSchema` when `versions` is not strictly increasing.
/// - `Sqlite` when any DDL statement fails; nothing is committed then.
pub fn upgrade(conn: &mut Connection, versions: &[SchemaVersion]) -> DbResult<SchemaUpgrade> {
    ensure_monotonic(versions)?;

    let current = current_user_version(conn)?;
    let latest = latest_version_of(versions);

    if current > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }

    let plan = SchemaUpgrade {
        from: current,
        to: latest,
    };
    if plan.is_noop() {
        return Ok(plan);
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    for version in versions.iter().filter(|v| v.version > current) {
        if let Err(err) = apply_version(&tx, version) {
            error!(
                "event=schema_upgrade module=db status=error from={current} to={latest} failed_version={} error={err}",
                version.version
            );
            return Err(err);
        }
    }
    tx.execute_batch(&format!("PRAGMA user_version = {latest};"))?;
    tx.commit()?;

    info!("event=schema_upgrade module=db status=ok from={current} to={latest}");
    Ok(plan)
}

fn apply_version(tx: &Transaction<'_>, version: &SchemaVersion) -> DbResult<()> {
    debug!(
        "event=schema_version_apply module=db version={} description=\"{}\"",
        version.version, version.description
    );

    for store in version.stores {
        if table_exists(tx, store.name)? {
            continue;
        }
        tx.execute_batch(&create_table_sql(store))?;
        for index in store.indexes {
            tx.execute_batch(&create_index_sql(store.name, index))?;
        }
    }

    for modification in version.modifications {
        match modification {
            Modification::AddIndex { store, index } => {
                if table_exists(tx, store)?
                    && !index_exists(tx, &physical_index_name(store, index.name))?
                {
                    tx.execute_batch(&create_index_sql(store, index))?;
                }
            }
            Modification::DropIndex { store, name } => {
                let physical = physical_index_name(store, name);
                if table_exists(tx, store)? && index_exists(tx, &physical)? {
                    tx.execute_batch(&format!("DROP INDEX {physical};"))?;
                }
            }
        }
    }

    Ok(())
}

fn latest_version_of(versions: &[SchemaVersion]) -> u32 {
    versions.last().map_or(0, |version| version.version)
}

fn ensure_monotonic(versions: &[SchemaVersion]) -> DbResult<()> {
    for pair in versions.windows(2) {
        if pair[1].version <= pair[0].version {
            return Err(DbError::InvalidSchema(format!(
                "version {} declared after version {}",
                pair[1].version, pair[0].version
            )));
        }
    }
    Ok(())
}

pub(crate) fn physical_index_name(store: &str, index: &str) -> String {
    format!("{store}_{index}")
}

fn create_table_sql(store: &StoreDef) -> String {
    let key_column = if store.auto_increment {
        format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", store.key_path)
    } else {
        format!("{} TEXT PRIMARY KEY NOT NULL", store.key_path)
    };

    let mut columns = vec![key_column];
    columns.extend(
        store
            .columns
            .iter()
            .map(|column| format!("{} {}", column.name, column.sql_type)),
    );

    format!("CREATE TABLE {} ({});", store.name, columns.join(", "))
}

fn create_index_sql(store: &str, index: &IndexDef) -> String {
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({});",
        if index.unique { "UNIQUE " } else { "" },
        physical_index_name(store, index.name),
        store,
        index.key_path.join(", ")
    )
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    sqlite_object_exists(conn, "table", table)
}

fn index_exists(conn: &Connection, index: &str) -> DbResult<bool> {
    sqlite_object_exists(conn, "index", index)
}

fn sqlite_object_exists(conn: &Connection, kind: &str, name: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = ?1 AND name = ?2
        );",
        [kind, name],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

#[cfg(test)]
mod tests {
    use super::{
        create_index_sql, create_table_sql, ensure_monotonic, IndexDef, SchemaVersion, NOTES_STORE,
        SCHEMA, SETTINGS_STORE,
    };
    use crate::db::DbError;

    #[test]
    fn auto_increment_store_uses_integer_key() {
        let sql = create_table_sql(&NOTES_STORE);
        assert!(sql.starts_with("CREATE TABLE notes (id INTEGER PRIMARY KEY AUTOINCREMENT, "));
        assert!(sql.contains("match_type TEXT NOT NULL"));
    }

    #[test]
    fn keyed_store_uses_text_key() {
        let sql = create_table_sql(&SETTINGS_STORE);
        assert_eq!(
            sql,
            "CREATE TABLE settings (id TEXT PRIMARY KEY NOT NULL, settings TEXT NOT NULL);"
        );
    }

    #[test]
    fn composite_index_joins_key_path() {
        let index = IndexDef {
            name: "pattern_match_type",
            key_path: &["pattern", "match_type"],
            unique: true,
        };
        assert_eq!(
            create_index_sql("notes", &index),
            "CREATE UNIQUE INDEX IF NOT EXISTS notes_pattern_match_type ON notes (pattern, match_type);"
        );
    }

    #[test]
    fn shipped_schema_is_monotonic() {
        ensure_monotonic(SCHEMA).expect("shipped schema must be ordered");
    }

    #[test]
    fn out_of_order_versions_are_rejected() {
        let versions = [
            SchemaVersion {
                version: 2,
                description: "two",
                stores: &[],
                modifications: &[],
            },
            SchemaVersion {
                version: 1,
                description: "one",
                stores: &[],
                modifications: &[],
            },
        ];
        let err = ensure_monotonic(&versions).unwrap_err();
        assert!(matches!(err, DbError::InvalidSchema(_)));
    }
}
