use catalog_core::db::migrations::latest_version;
use catalog_core::db::{open_db, open_db_in_memory, DbError, DbStage};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "records");
    assert_table_exists(&conn, "record_genres");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.sqlite3");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "records");
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

#[test]
fn newer_schema_error_has_stable_code() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 7;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    assert_eq!(err.code(), "db_schema_unsupported");
    assert!(err.to_string().contains("newer than supported"));
}

#[test]
fn non_database_file_fails_during_bootstrap_with_stage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.sqlite3");
    std::fs::write(&path, vec![0x5a_u8; 4096]).unwrap();

    let err = open_db(&path).unwrap_err();
    match &err {
        DbError::Sqlite { stage, .. } => {
            assert!(matches!(stage, DbStage::Configure | DbStage::Migrate));
            assert!(err.code().starts_with("db_"));
            assert!(std::error::Error::source(&err).is_some());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn deleting_record_cascades_to_genres() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO records (rawid, title, title_key, author, author_key, year, price)
         VALUES (1, 'Dune', 'dune', 'Frank Herbert', 'frank herbert', 1965, 10.0);
         INSERT INTO record_genres (record_id, genre) VALUES (1, 'SCI_FI'), (1, 'NOVEL');",
    )
    .unwrap();

    conn.execute("DELETE FROM records WHERE rawid = 1;", []).unwrap();

    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM record_genres;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(remaining, 0);
}

#[test]
fn schema_rejects_negative_price_and_duplicate_title_key() {
    let conn = open_db_in_memory().unwrap();
    let negative = conn.execute(
        "INSERT INTO records (rawid, title, title_key, author, author_key, year, price)
         VALUES (1, 'Dune', 'dune', 'Frank Herbert', 'frank herbert', 1965, -1.0);",
        [],
    );
    assert!(negative.is_err());

    conn.execute(
        "INSERT INTO records (rawid, title, title_key, author, author_key, year, price)
         VALUES (1, 'Dune', 'dune', 'Frank Herbert', 'frank herbert', 1965, 10.0);",
        [],
    )
    .unwrap();
    let duplicate = conn.execute(
        "INSERT INTO records (rawid, title, title_key, author, author_key, year, price)
         VALUES (2, 'DUNE', 'dune', 'Someone Else', 'someone else', 1970, 5.0);",
        [],
    );
    assert!(duplicate.is_err());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
