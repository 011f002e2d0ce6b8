//! Route handler functions for all API endpoints.
//!
//! Each handler extracts query/path/body parameters via axum extractors,
//! interacts with AppState services, and returns JSON responses.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use dossier_chat::{ChatMode, SourceRef};
use dossier_core::error::DossierError;
use dossier_core::types::ChatRole;
use dossier_index::chunk::chunk_pages;
use dossier_index::extract::{extract_pages, DocumentKind};
use dossier_store::{DocumentRepository, MessageRepository, ThreadRepository};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request parameter types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateThreadParams {
    pub name: Option<String>,
    pub owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListThreadsParams {
    pub owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ThreadScopedParams {
    pub thread_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub thread_id: Uuid,
    pub message: String,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadResponse {
    pub thread_id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub seq: i64,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadMessagesResponse {
    pub thread_id: Uuid,
    pub messages: Vec<MessageResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadDeletedResponse {
    pub deleted: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub thread_id: Uuid,
    pub reply: String,
    pub mode: ChatMode,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub thread_id: Uuid,
    pub document_id: Uuid,
    pub filename: String,
    pub chunks_indexed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub document_id: Uuid,
    pub thread_id: Uuid,
    pub filename: String,
    pub chunk_count: usize,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub thread_id: Uuid,
    pub documents: Vec<DocumentResponse>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentDeletedResponse {
    pub deleted: Uuid,
    pub filename: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub indexed_passages: usize,
}

// =============================================================================
// Thread handlers
// =============================================================================

/// POST /threads - create a conversation thread.
pub async fn create_thread(
    State(state): State<AppState>,
    Query(params): Query<CreateThreadParams>,
) -> Result<Json<ThreadResponse>, ApiError> {
    let threads = ThreadRepository::new(Arc::clone(&state.database));
    let record = threads.create(
        params.owner_id.as_deref().unwrap_or(""),
        params.name.as_deref().unwrap_or("New Chat"),
    )?;
    Ok(Json(ThreadResponse {
        thread_id: record.id,
        owner_id: record.owner_id,
        name: record.name,
        created_at: record.created_at,
    }))
}

/// GET /threads - list threads, newest first.
pub async fn list_threads(
    State(state): State<AppState>,
    Query(params): Query<ListThreadsParams>,
) -> Result<Json<Vec<ThreadResponse>>, ApiError> {
    let threads = ThreadRepository::new(Arc::clone(&state.database));
    let records = threads.list(params.owner_id.as_deref())?;
    Ok(Json(
        records
            .into_iter()
            .map(|r| ThreadResponse {
                thread_id: r.id,
                owner_id: r.owner_id,
                name: r.name,
                created_at: r.created_at,
            })
            .collect(),
    ))
}

/// GET /threads/{id}/messages - full conversation log in insertion order.
pub async fn thread_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
) -> Result<Json<ThreadMessagesResponse>, ApiError> {
    let threads = ThreadRepository::new(Arc::clone(&state.database));
    if threads.get(thread_id)?.is_none() {
        return Err(ApiError::NotFound(format!("thread not found: {}", thread_id)));
    }

    let messages = MessageRepository::new(Arc::clone(&state.database)).list_all(thread_id)?;
    Ok(Json(ThreadMessagesResponse {
        thread_id,
        messages: messages
            .into_iter()
            .map(|m| MessageResponse {
                seq: m.seq,
                role: m.role,
                content: m.content,
                created_at: m.created_at,
            })
            .collect(),
    }))
}

/// DELETE /threads/{id} - delete a thread and everything attached to it.
pub async fn delete_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
) -> Result<Json<ThreadDeletedResponse>, ApiError> {
    // Vectors for the thread's documents go first; the cascading row delete
    // below would otherwise orphan them until the next rebuild.
    let documents = DocumentRepository::new(Arc::clone(&state.database));
    for doc in documents.list_for_thread(thread_id)? {
        if let Err(e) = state.index.delete_by_document(doc.id) {
            warn!(document_id = %doc.id, error = %e, "Vector delete failed during thread delete");
        }
        remove_stored_file(&doc.storage_path).await;
    }

    let threads = ThreadRepository::new(Arc::clone(&state.database));
    if !threads.delete(thread_id)? {
        return Err(ApiError::NotFound(format!("thread not found: {}", thread_id)));
    }
    Ok(Json(ThreadDeletedResponse { deleted: thread_id }))
}

// =============================================================================
// Chat handlers
// =============================================================================

/// POST /chat/send - batch reply.
pub async fn send_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let outcome = state
        .orchestrator
        .handle_message(request.thread_id, &request.message)
        .await?;
    Ok(Json(ChatResponse {
        thread_id: request.thread_id,
        reply: outcome.reply,
        mode: outcome.mode,
        sources: outcome.sources,
    }))
}

/// POST /chat/stream - SSE reply: `{"chunk": ...}` events, then
/// `{"done": true}` (or `{"error": ...}` on a terminal failure).
pub async fn stream_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let reply_stream = state
        .orchestrator
        .handle_message_stream(request.thread_id, &request.message)
        .await?;

    let events = reply_stream
        .map(|item| {
            let payload = match item {
                Ok(chunk) => serde_json::json!({ "chunk": chunk }),
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            };
            Ok::<Event, Infallible>(Event::default().data(payload.to_string()))
        })
        .chain(futures_util::stream::once(async {
            Ok(Event::default().data(serde_json::json!({ "done": true }).to_string()))
        }));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// =============================================================================
// Document handlers
// =============================================================================

/// POST /documents/upload?thread_id= - multipart PDF or plain-text upload.
pub async fn upload_document(
    State(state): State<AppState>,
    Query(params): Query<ThreadScopedParams>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let thread_id = params.thread_id;
    let threads = ThreadRepository::new(Arc::clone(&state.database));
    if threads.get(thread_id)?.is_none() {
        return Err(ApiError::NotFound(format!("thread not found: {}", thread_id)));
    }

    // Locate the file field.
    let mut upload: Option<(String, DocumentKind, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(sanitize_filename)
            .unwrap_or_else(|| "document.pdf".to_string());
        let content_type = field.content_type().unwrap_or("").to_string();
        let Some(kind) = DocumentKind::from_content_type(&content_type) else {
            return Err(ApiError::BadRequest(format!(
                "Unsupported content type '{}'. Expected application/pdf or text/plain.",
                content_type
            )));
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;
        upload = Some((filename, kind, data.to_vec()));
        break;
    }

    let Some((filename, kind, data)) = upload else {
        return Err(ApiError::BadRequest("missing 'file' field".to_string()));
    };

    let max_bytes = state.config.upload.max_size_mb * 1024 * 1024;
    if data.len() as u64 > max_bytes {
        return Err(ApiError::BadRequest(format!(
            "File too large ({:.1} MB). Max: {} MB.",
            data.len() as f64 / (1024.0 * 1024.0),
            state.config.upload.max_size_mb
        )));
    }

    // Store original bytes before indexing; removed again on any failure so
    // a rejected upload leaves nothing behind.
    let document_id = Uuid::new_v4();
    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to create upload dir: {}", e)))?;
    let storage_path = state
        .upload_dir
        .join(format!("{}_{}", document_id, filename));
    tokio::fs::write(&storage_path, &data)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to store upload: {}", e)))?;

    match index_upload(&state, thread_id, document_id, &filename, &storage_path, kind, data).await {
        Ok(chunks_indexed) => Ok(Json(UploadResponse {
            thread_id,
            document_id,
            filename,
            chunks_indexed,
        })),
        Err(e) => {
            remove_stored_file(&storage_path.to_string_lossy()).await;
            Err(e)
        }
    }
}

/// Extraction, chunking, and indexing for one stored upload.
async fn index_upload(
    state: &AppState,
    thread_id: Uuid,
    document_id: Uuid,
    filename: &str,
    storage_path: &std::path::Path,
    kind: DocumentKind,
    data: Vec<u8>,
) -> Result<usize, ApiError> {
    // PDF parsing is CPU-bound; keep it off the async workers.
    let pages = tokio::task::spawn_blocking(move || extract_pages(&data, kind))
        .await
        .map_err(|e| ApiError::Internal(format!("extraction task panicked: {}", e)))??;

    let chunks = chunk_pages(
        &pages,
        state.config.chunking.window_chars,
        state.config.chunking.overlap_chars,
    );
    if chunks.is_empty() {
        return Err(DossierError::EmptyDocument(filename.to_string()).into());
    }

    let record = state
        .pipeline
        .index_document(
            thread_id,
            document_id,
            filename,
            &storage_path.to_string_lossy(),
            &chunks,
        )
        .await?;
    Ok(record.chunk_count)
}

/// GET /documents?thread_id= - list a thread's documents.
pub async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<ThreadScopedParams>,
) -> Result<Json<DocumentListResponse>, ApiError> {
    let documents = DocumentRepository::new(Arc::clone(&state.database));
    let records = documents.list_for_thread(params.thread_id)?;
    let documents: Vec<DocumentResponse> = records
        .into_iter()
        .map(|d| DocumentResponse {
            document_id: d.id,
            thread_id: d.thread_id,
            filename: d.filename,
            chunk_count: d.chunk_count,
            uploaded_at: d.uploaded_at,
        })
        .collect();
    Ok(Json(DocumentListResponse {
        thread_id: params.thread_id,
        count: documents.len(),
        documents,
    }))
}

/// DELETE /documents/{id} - delete metadata, passages, vectors, and the
/// stored file.
pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<DocumentDeletedResponse>, ApiError> {
    let record = state.pipeline.remove_document(document_id)?;
    remove_stored_file(&record.storage_path).await;
    Ok(Json(DocumentDeletedResponse {
        deleted: record.id,
        filename: record.filename,
    }))
}

// =============================================================================
// Health
// =============================================================================

/// GET /health - service status.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        indexed_passages: state.index.len(),
    })
}

// =============================================================================
// Helpers
// =============================================================================

/// Strip path separators from a client-supplied filename.
fn sanitize_filename(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

/// Best-effort removal of a stored upload file.
async fn remove_stored_file(path: &str) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path, error = %e, "Failed to remove stored upload");
        }
    }
}
