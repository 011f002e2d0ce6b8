//! Database schema migrations.
//!
//! Applies the initial schema: threads, messages, documents, passages, and
//! the schema_migrations tracking table.

use rusqlite::Connection;
use tracing::info;

use dossier_core::error::DossierError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental
/// changes.
pub fn run_migrations(conn: &Connection) -> Result<(), DossierError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| DossierError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| DossierError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), DossierError> {
    conn.execute_batch(
        "
        -- Conversation threads. owner_id is a passthrough identifier.
        CREATE TABLE IF NOT EXISTS threads (
            id          TEXT PRIMARY KEY NOT NULL,
            owner_id    TEXT NOT NULL DEFAULT '',
            name        TEXT NOT NULL DEFAULT 'New Chat',
            created_at  TEXT NOT NULL
        );

        -- Ordered conversation log. seq (rowid) defines conversation order.
        CREATE TABLE IF NOT EXISTS messages (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            thread_id   TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
            role        TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_thread
            ON messages (thread_id, seq);

        -- Uploaded document metadata.
        CREATE TABLE IF NOT EXISTS documents (
            id            TEXT PRIMARY KEY NOT NULL,
            thread_id     TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
            filename      TEXT NOT NULL,
            storage_path  TEXT NOT NULL,
            chunk_count   INTEGER NOT NULL DEFAULT 0,
            uploaded_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_documents_thread
            ON documents (thread_id);

        -- Derived passages with their embeddings (little-endian f32 blob),
        -- used to rebuild the vector index on startup. thread_id is
        -- denormalized here and must always match the parent document's.
        CREATE TABLE IF NOT EXISTS passages (
            id           TEXT PRIMARY KEY NOT NULL,
            document_id  TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            thread_id    TEXT NOT NULL,
            filename     TEXT NOT NULL,
            page         INTEGER NOT NULL DEFAULT 1,
            content      TEXT NOT NULL,
            embedding    BLOB NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_passages_document
            ON passages (document_id);

        CREATE INDEX IF NOT EXISTS idx_passages_thread
            ON passages (thread_id);
        ",
    )
    .map_err(|e| DossierError::Storage(format!("Migration v1 failed: {}", e)))?;

    conn.execute(
        "INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema')",
        [],
    )
    .map_err(|e| DossierError::Storage(format!("Failed to record migration v1: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn test_migrations_create_tables() {
        let conn = open();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table'
                   AND name IN ('threads', 'messages', 'documents', 'passages')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 4);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = open();
        run_migrations(&conn).unwrap();
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_role_check_constraint() {
        let conn = open();
        conn.execute(
            "INSERT INTO threads (id, owner_id, name, created_at) VALUES ('t1', 'u', 'n', 'now')",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO messages (thread_id, role, content, created_at)
             VALUES ('t1', 'tool', 'x', 'now')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_thread_delete_cascades() {
        let conn = open();
        conn.execute(
            "INSERT INTO threads (id, owner_id, name, created_at) VALUES ('t1', 'u', 'n', 'now')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO messages (thread_id, role, content, created_at)
             VALUES ('t1', 'user', 'hello', 'now')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO documents (id, thread_id, filename, storage_path, chunk_count, uploaded_at)
             VALUES ('d1', 't1', 'f.pdf', '/tmp/f.pdf', 1, 'now')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO passages (id, document_id, thread_id, filename, page, content, embedding)
             VALUES ('p1', 'd1', 't1', 'f.pdf', 1, 'text', x'00000000')",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM threads WHERE id = 't1'", []).unwrap();

        for table in ["messages", "documents", "passages"] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })
                .unwrap();
            assert_eq!(count, 0, "{} not cascaded", table);
        }
    }
}
