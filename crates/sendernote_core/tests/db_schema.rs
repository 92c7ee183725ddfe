use rusqlite::Connection;
use sendernote_core::db::schema::{
    latest_version, upgrade, ColumnDef, IndexDef, Modification, SchemaVersion, StoreDef, SCHEMA,
};
use sendernote_core::db::{open_db, open_db_in_memory, DbError};

#[test]
fn open_db_in_memory_creates_every_store() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(latest_version(), 2);
    assert_eq!(schema_version(&conn), latest_version());
    for table in ["migrations", "notes", "templates", "settings"] {
        assert!(object_exists(&conn, "table", table), "missing table {table}");
    }
    assert!(object_exists(&conn, "index", "notes_match_type"));
    assert!(object_exists(&conn, "index", "notes_pattern_match_type"));
    assert!(object_exists(&conn, "index", "templates_sort_order"));
    assert!(object_exists(&conn, "index", "migrations_applied_at"));
    assert!(!object_exists(&conn, "index", "notes_pattern"));
}

#[test]
fn version_one_database_is_upgraded_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("v1.sqlite3");

    let mut conn = Connection::open(&path).unwrap();
    let plan = upgrade(&mut conn, &SCHEMA[..1]).unwrap();
    assert_eq!((plan.from, plan.to), (0, 1));
    assert!(object_exists(&conn, "index", "notes_pattern"));
    conn.execute(
        "INSERT INTO notes (pattern, match_type, note, created_at, updated_at)
         VALUES ('boss@corp.com', 'exact', 'VIP', '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z');",
        [],
    )
    .unwrap();
    drop(conn);

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), 2);
    assert!(!object_exists(&conn, "index", "notes_pattern"));
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM notes;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sendernote.sqlite3");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let mut conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let plan = upgrade(&mut conn_second, SCHEMA).unwrap();
    assert!(plan.is_noop());
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

const BROKEN_STORE: StoreDef = StoreDef {
    name: "broken",
    key_path: "id",
    auto_increment: false,
    columns: &[ColumnDef {
        name: "value",
        sql_type: "TEXT NOT NULL",
    }],
    indexes: &[IndexDef {
        name: "missing",
        key_path: &["missing_column"],
        unique: false,
    }],
};

#[test]
fn failing_version_rolls_back_the_whole_upgrade() {
    let mut conn = Connection::open_in_memory().unwrap();
    let versions = [
        SCHEMA[0],
        SchemaVersion {
            version: 2,
            description: "index over a column that does not exist",
            stores: &[BROKEN_STORE],
            modifications: &[],
        },
    ];

    let err = upgrade(&mut conn, &versions).unwrap_err();
    assert!(matches!(err, DbError::Sqlite(_)));

    assert_eq!(schema_version(&conn), 0);
    assert!(!object_exists(&conn, "table", "notes"));
    assert!(!object_exists(&conn, "table", "broken"));
}

const ORIGINAL_EMAIL_INDEX: IndexDef = IndexDef {
    name: "original_email",
    key_path: &["original_email"],
    unique: false,
};

fn with_original_email_index() -> [SchemaVersion; 3] {
    [
        SCHEMA[0],
        SCHEMA[1],
        SchemaVersion {
            version: 3,
            description: "index notes by original email",
            stores: &[],
            modifications: &[Modification::AddIndex {
                store: "notes",
                index: ORIGINAL_EMAIL_INDEX,
            }],
        },
    ]
}

#[test]
fn add_index_modification_creates_the_index() {
    let mut conn = Connection::open_in_memory().unwrap();
    upgrade(&mut conn, SCHEMA).unwrap();
    assert!(!object_exists(&conn, "index", "notes_original_email"));

    let plan = upgrade(&mut conn, &with_original_email_index()).unwrap();
    assert_eq!((plan.from, plan.to), (2, 3));
    assert_eq!(schema_version(&conn), 3);
    assert!(object_exists(&conn, "index", "notes_original_email"));
}

#[test]
fn add_index_tolerates_an_index_that_already_exists() {
    let mut conn = Connection::open_in_memory().unwrap();
    upgrade(&mut conn, SCHEMA).unwrap();
    conn.execute_batch("CREATE INDEX notes_original_email ON notes (original_email);")
        .unwrap();

    let plan = upgrade(&mut conn, &with_original_email_index()).unwrap();
    assert_eq!(plan.to, 3);
    assert!(object_exists(&conn, "index", "notes_original_email"));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn object_exists(conn: &Connection, kind: &str, name: &str) -> bool {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            );",
            [kind, name],
            |row| row.get(0),
        )
        .unwrap();
    exists == 1
}
