//! Repository implementations for SQLite-backed persistence.
//!
//! ThreadRepository, MessageRepository, DocumentRepository, and
//! PassageRepository operate on the Database struct using raw SQL.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use dossier_core::error::DossierError;
use dossier_core::types::{ChatRole, DocumentRecord, MessageRecord, Passage, ThreadRecord};

use crate::db::Database;

/// Serialize an embedding as a little-endian f32 blob.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Deserialize a little-endian f32 blob back into an embedding.
fn blob_to_embedding(blob: &[u8]) -> Result<Vec<f32>, DossierError> {
    if blob.len() % 4 != 0 {
        return Err(DossierError::Storage(format!(
            "embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn parse_uuid(s: &str) -> Result<Uuid, DossierError> {
    Uuid::parse_str(s).map_err(|e| DossierError::Storage(format!("invalid uuid {}: {}", s, e)))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DossierError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DossierError::Storage(format!("invalid timestamp {}: {}", s, e)))
}

fn row_to_thread(row: &Row<'_>) -> Result<ThreadRecord, DossierError> {
    let id: String = row.get(0).map_err(|e| DossierError::Storage(e.to_string()))?;
    let owner_id: String = row.get(1).map_err(|e| DossierError::Storage(e.to_string()))?;
    let name: String = row.get(2).map_err(|e| DossierError::Storage(e.to_string()))?;
    let created_at: String = row.get(3).map_err(|e| DossierError::Storage(e.to_string()))?;
    Ok(ThreadRecord {
        id: parse_uuid(&id)?,
        owner_id,
        name,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_message(row: &Row<'_>) -> Result<MessageRecord, DossierError> {
    let seq: i64 = row.get(0).map_err(|e| DossierError::Storage(e.to_string()))?;
    let thread_id: String = row.get(1).map_err(|e| DossierError::Storage(e.to_string()))?;
    let role: String = row.get(2).map_err(|e| DossierError::Storage(e.to_string()))?;
    let content: String = row.get(3).map_err(|e| DossierError::Storage(e.to_string()))?;
    let created_at: String = row.get(4).map_err(|e| DossierError::Storage(e.to_string()))?;
    Ok(MessageRecord {
        seq,
        thread_id: parse_uuid(&thread_id)?,
        role: ChatRole::parse(&role)?,
        content,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_document(row: &Row<'_>) -> Result<DocumentRecord, DossierError> {
    let id: String = row.get(0).map_err(|e| DossierError::Storage(e.to_string()))?;
    let thread_id: String = row.get(1).map_err(|e| DossierError::Storage(e.to_string()))?;
    let filename: String = row.get(2).map_err(|e| DossierError::Storage(e.to_string()))?;
    let storage_path: String = row.get(3).map_err(|e| DossierError::Storage(e.to_string()))?;
    let chunk_count: i64 = row.get(4).map_err(|e| DossierError::Storage(e.to_string()))?;
    let uploaded_at: String = row.get(5).map_err(|e| DossierError::Storage(e.to_string()))?;
    Ok(DocumentRecord {
        id: parse_uuid(&id)?,
        thread_id: parse_uuid(&thread_id)?,
        filename,
        storage_path,
        chunk_count: chunk_count as usize,
        uploaded_at: parse_timestamp(&uploaded_at)?,
    })
}

// =============================================================================
// ThreadRepository
// =============================================================================

/// Repository for conversation threads.
pub struct ThreadRepository {
    db: Arc<Database>,
}

impl ThreadRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a new thread and return its record.
    pub fn create(&self, owner_id: &str, name: &str) -> Result<ThreadRecord, DossierError> {
        let record = ThreadRecord {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO threads (id, owner_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    record.id.to_string(),
                    record.owner_id,
                    record.name,
                    record.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| DossierError::Storage(format!("Failed to create thread: {}", e)))?;
            Ok(())
        })?;
        Ok(record)
    }

    /// Find a thread by ID.
    pub fn get(&self, id: Uuid) -> Result<Option<ThreadRecord>, DossierError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, owner_id, name, created_at FROM threads WHERE id = ?1")
                .map_err(|e| DossierError::Storage(e.to_string()))?;
            let result = stmt
                .query_row(rusqlite::params![id.to_string()], |row| {
                    Ok(row_to_thread(row))
                })
                .optional()
                .map_err(|e| DossierError::Storage(e.to_string()))?;
            match result {
                Some(thread) => Ok(Some(thread?)),
                None => Ok(None),
            }
        })
    }

    /// List threads, newest first. When `owner_id` is given, only that
    /// owner's threads are returned.
    pub fn list(&self, owner_id: Option<&str>) -> Result<Vec<ThreadRecord>, DossierError> {
        self.db.with_conn(|conn| {
            let (sql, params): (&str, Vec<String>) = match owner_id {
                Some(owner) => (
                    "SELECT id, owner_id, name, created_at FROM threads
                     WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC",
                    vec![owner.to_string()],
                ),
                None => (
                    "SELECT id, owner_id, name, created_at FROM threads
                     ORDER BY created_at DESC, rowid DESC",
                    vec![],
                ),
            };
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| DossierError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                    Ok(row_to_thread(row))
                })
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let mut threads = Vec::new();
            for row in rows {
                threads.push(row.map_err(|e| DossierError::Storage(e.to_string()))??);
            }
            Ok(threads)
        })
    }

    /// Delete a thread, cascading to its messages, documents, and passages.
    ///
    /// Returns false when the thread does not exist.
    pub fn delete(&self, id: Uuid) -> Result<bool, DossierError> {
        self.db.with_conn(|conn| {
            let affected = conn
                .execute(
                    "DELETE FROM threads WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                )
                .map_err(|e| DossierError::Storage(format!("Failed to delete thread: {}", e)))?;
            Ok(affected > 0)
        })
    }
}

// =============================================================================
// MessageRepository
// =============================================================================

/// Repository for the ordered conversation log.
pub struct MessageRepository {
    db: Arc<Database>,
}

impl MessageRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append a message to a thread, assigning its sequence number.
    pub fn append(
        &self,
        thread_id: Uuid,
        role: ChatRole,
        content: &str,
    ) -> Result<MessageRecord, DossierError> {
        let created_at = Utc::now();
        let seq = self.db.with_conn(|conn| {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM threads WHERE id = ?1",
                    rusqlite::params![thread_id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| DossierError::Storage(e.to_string()))?;
            if exists.is_none() {
                return Err(DossierError::ThreadNotFound(thread_id));
            }

            conn.execute(
                "INSERT INTO messages (thread_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    thread_id.to_string(),
                    role.as_str(),
                    content,
                    created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| DossierError::Storage(format!("Failed to append message: {}", e)))?;
            Ok(conn.last_insert_rowid())
        })?;

        Ok(MessageRecord {
            seq,
            thread_id,
            role,
            content: content.to_string(),
            created_at,
        })
    }

    /// Read the most recent `limit` user/assistant messages, oldest first.
    ///
    /// System rows are excluded: prompt assembly re-issues a fresh system
    /// instruction per turn rather than replaying stale ones.
    pub fn history(&self, thread_id: Uuid, limit: usize) -> Result<Vec<MessageRecord>, DossierError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT seq, thread_id, role, content, created_at FROM messages
                     WHERE thread_id = ?1 AND role IN ('user', 'assistant')
                     ORDER BY seq DESC LIMIT ?2",
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![thread_id.to_string(), limit as i64],
                    |row| Ok(row_to_message(row)),
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let mut messages = Vec::new();
            for row in rows {
                messages.push(row.map_err(|e| DossierError::Storage(e.to_string()))??);
            }
            // Query returned newest-first; conversation order is oldest-first.
            messages.reverse();
            Ok(messages)
        })
    }

    /// Read every message of a thread in insertion order, including system
    /// rows (for API consumers, not for prompt assembly).
    pub fn list_all(&self, thread_id: Uuid) -> Result<Vec<MessageRecord>, DossierError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT seq, thread_id, role, content, created_at FROM messages
                     WHERE thread_id = ?1 ORDER BY seq ASC",
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params![thread_id.to_string()], |row| {
                    Ok(row_to_message(row))
                })
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let mut messages = Vec::new();
            for row in rows {
                messages.push(row.map_err(|e| DossierError::Storage(e.to_string()))??);
            }
            Ok(messages)
        })
    }
}

// =============================================================================
// DocumentRepository
// =============================================================================

/// Repository for uploaded document metadata.
pub struct DocumentRepository {
    db: Arc<Database>,
}

impl DocumentRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a document and its passages (with embeddings) in a single
    /// transaction. Either everything lands or nothing does.
    pub fn insert_with_passages(
        &self,
        document: &DocumentRecord,
        passages: &[Passage],
        embeddings: &[Vec<f32>],
    ) -> Result<(), DossierError> {
        if passages.len() != embeddings.len() {
            return Err(DossierError::Storage(format!(
                "passage/embedding count mismatch: {} vs {}",
                passages.len(),
                embeddings.len()
            )));
        }
        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            tx.execute(
                "INSERT INTO documents (id, thread_id, filename, storage_path, chunk_count, uploaded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    document.id.to_string(),
                    document.thread_id.to_string(),
                    document.filename,
                    document.storage_path,
                    document.chunk_count as i64,
                    document.uploaded_at.to_rfc3339(),
                ],
            )
            .map_err(|e| DossierError::Storage(format!("Failed to insert document: {}", e)))?;

            for (passage, embedding) in passages.iter().zip(embeddings.iter()) {
                tx.execute(
                    "INSERT INTO passages (id, document_id, thread_id, filename, page, content, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        passage.id.to_string(),
                        passage.document_id.to_string(),
                        passage.thread_id.to_string(),
                        passage.filename,
                        passage.page as i64,
                        passage.content,
                        embedding_to_blob(embedding),
                    ],
                )
                .map_err(|e| DossierError::Storage(format!("Failed to insert passage: {}", e)))?;
            }

            tx.commit()
                .map_err(|e| DossierError::Storage(format!("Failed to commit document: {}", e)))?;
            Ok(())
        })
    }

    /// Find a document by ID.
    pub fn get(&self, id: Uuid) -> Result<Option<DocumentRecord>, DossierError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, thread_id, filename, storage_path, chunk_count, uploaded_at
                     FROM documents WHERE id = ?1",
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;
            let result = stmt
                .query_row(rusqlite::params![id.to_string()], |row| {
                    Ok(row_to_document(row))
                })
                .optional()
                .map_err(|e| DossierError::Storage(e.to_string()))?;
            match result {
                Some(doc) => Ok(Some(doc?)),
                None => Ok(None),
            }
        })
    }

    /// List a thread's documents in upload order.
    pub fn list_for_thread(&self, thread_id: Uuid) -> Result<Vec<DocumentRecord>, DossierError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, thread_id, filename, storage_path, chunk_count, uploaded_at
                     FROM documents WHERE thread_id = ?1 ORDER BY rowid ASC",
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params![thread_id.to_string()], |row| {
                    Ok(row_to_document(row))
                })
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let mut documents = Vec::new();
            for row in rows {
                documents.push(row.map_err(|e| DossierError::Storage(e.to_string()))??);
            }
            Ok(documents)
        })
    }

    /// Count documents attached to a thread.
    pub fn count_for_thread(&self, thread_id: Uuid) -> Result<u64, DossierError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM documents WHERE thread_id = ?1",
                    rusqlite::params![thread_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }

    /// Delete a document's metadata and passage rows in one transaction.
    ///
    /// Returns the deleted record so the caller can remove vectors and the
    /// stored file afterwards, or None when the id is unknown.
    pub fn delete(&self, id: Uuid) -> Result<Option<DocumentRecord>, DossierError> {
        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let record = {
                let mut stmt = tx
                    .prepare(
                        "SELECT id, thread_id, filename, storage_path, chunk_count, uploaded_at
                         FROM documents WHERE id = ?1",
                    )
                    .map_err(|e| DossierError::Storage(e.to_string()))?;
                stmt.query_row(rusqlite::params![id.to_string()], |row| {
                    Ok(row_to_document(row))
                })
                .optional()
                .map_err(|e| DossierError::Storage(e.to_string()))?
            };

            let record = match record {
                Some(r) => r?,
                None => return Ok(None),
            };

            tx.execute(
                "DELETE FROM passages WHERE document_id = ?1",
                rusqlite::params![id.to_string()],
            )
            .map_err(|e| DossierError::Storage(format!("Failed to delete passages: {}", e)))?;
            tx.execute(
                "DELETE FROM documents WHERE id = ?1",
                rusqlite::params![id.to_string()],
            )
            .map_err(|e| DossierError::Storage(format!("Failed to delete document: {}", e)))?;

            tx.commit()
                .map_err(|e| DossierError::Storage(format!("Failed to commit delete: {}", e)))?;
            Ok(Some(record))
        })
    }
}

// =============================================================================
// PassageRepository
// =============================================================================

/// Repository for persisted passages, used to rebuild the vector index.
pub struct PassageRepository {
    db: Arc<Database>,
}

impl PassageRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Load every persisted passage with its embedding, in insertion order.
    pub fn load_all(&self) -> Result<Vec<(Passage, Vec<f32>)>, DossierError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, document_id, thread_id, filename, page, content, embedding
                     FROM passages ORDER BY rowid ASC",
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    let id: String = row.get(0)?;
                    let document_id: String = row.get(1)?;
                    let thread_id: String = row.get(2)?;
                    let filename: String = row.get(3)?;
                    let page: i64 = row.get(4)?;
                    let content: String = row.get(5)?;
                    let blob: Vec<u8> = row.get(6)?;
                    Ok((id, document_id, thread_id, filename, page, content, blob))
                })
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let mut passages = Vec::new();
            for row in rows {
                let (id, document_id, thread_id, filename, page, content, blob) =
                    row.map_err(|e| DossierError::Storage(e.to_string()))?;
                passages.push((
                    Passage {
                        id: parse_uuid(&id)?,
                        document_id: parse_uuid(&document_id)?,
                        thread_id: parse_uuid(&thread_id)?,
                        filename,
                        page: page as u32,
                        content,
                    },
                    blob_to_embedding(&blob)?,
                ));
            }
            Ok(passages)
        })
    }

    /// Count passages indexed for a thread.
    pub fn count_for_thread(&self, thread_id: Uuid) -> Result<u64, DossierError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM passages WHERE thread_id = ?1",
                    rusqlite::params![thread_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
