use notegraph_core::db::migrations::latest_version;
use notegraph_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn in_memory_cache_has_full_schema() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in [
        "graph_nodes",
        "graph_node_terms",
        "graph_edges",
        "graph_edge_contributions",
        "graph_cache_meta",
    ] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn reopening_cache_file_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");

    let first = open_db(&path).unwrap();
    assert_eq!(schema_version(&first), latest_version());
    drop(first);

    let second = open_db(&path).unwrap();
    assert_eq!(schema_version(&second), latest_version());
    assert_table_exists(&second, "graph_edges");
}

#[test]
fn newer_schema_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

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
fn edge_uniqueness_is_enforced_by_schema() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO graph_nodes (id, kind, title, version) VALUES ('a', 'note', 'A', 1);
         INSERT INTO graph_nodes (id, kind, title, version) VALUES ('b', 'person', 'B', 1);
         INSERT INTO graph_edges (id, source_id, target_id, kind, strength, origin, declared_by, created_at, updated_at)
         VALUES ('e1', 'a', 'b', 'mentions', 0.5, 'detected', NULL, 1, 1);",
    )
    .unwrap();

    let duplicate = conn.execute(
        "INSERT INTO graph_edges (id, source_id, target_id, kind, strength, origin, declared_by, created_at, updated_at)
         VALUES ('e2', 'a', 'b', 'mentions', 0.7, 'detected', NULL, 2, 2);",
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
