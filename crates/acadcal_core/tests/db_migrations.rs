use acadcal_core::db::migrations::latest_version;
use acadcal_core::db::{open_db, open_db_in_memory, DbError};
use acadcal_core::{RepoError, SqliteCalendarRepository};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "academic_years");
    assert_table_exists(&conn, "terms");
    assert_index_exists(&conn, "idx_terms_single_current");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("acadcal.sqlite3");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "terms");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
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
fn repository_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let err = SqliteCalendarRepository::try_new(&conn, "tenant-a")
        .err()
        .expect("unmigrated connection must be rejected");
    assert!(matches!(
        err,
        RepoError::UninitializedConnection {
            actual_version: 0,
            ..
        }
    ));
}

#[test]
fn schema_refuses_second_current_term_and_year_reassignment() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO academic_years (id, tenant_id, name, start_date, end_date)
         VALUES ('y1', 't', '2024', '2024-01-01', '2024-12-01'),
                ('y2', 't', '2025', '2025-01-01', '2025-12-01');
         INSERT INTO terms (id, tenant_id, academic_year_id, name, start_date, end_date, is_current)
         VALUES ('a', 't', 'y1', 'Term 1', '2024-01-01', '2024-04-01', 1),
                ('b', 't', 'y1', 'Term 2', '2024-04-02', '2024-07-01', 0);",
    )
    .unwrap();

    assert!(conn
        .execute("UPDATE terms SET is_current = 1 WHERE id = 'b';", [])
        .is_err());
    assert!(conn
        .execute("UPDATE terms SET academic_year_id = 'y2' WHERE id = 'a';", [])
        .is_err());
    assert!(conn
        .execute(
            "INSERT INTO academic_years (id, tenant_id, name, start_date, end_date)
             VALUES ('y3', 't', 'bad', '2024-05-01', '2024-05-01');",
            [],
        )
        .is_err());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    assert_schema_object(conn, "table", table_name);
}

fn assert_index_exists(conn: &Connection, index_name: &str) {
    assert_schema_object(conn, "index", index_name);
}

fn assert_schema_object(conn: &Connection, kind: &str, name: &str) {
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
    assert_eq!(exists, 1, "{kind} {name} does not exist");
}
