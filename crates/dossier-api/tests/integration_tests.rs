//! Integration tests for the Dossier API.
//!
//! Covers thread, chat, streaming, and document endpoints over happy and
//! error paths. Each test builds an independent in-memory state.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use dossier_api::create_router;
use dossier_api::state::AppState;
use dossier_chat::generation::MockGeneration;
use dossier_core::config::DossierConfig;
use dossier_index::embedding::MockEmbedding;
use dossier_index::VectorIndex;
use dossier_store::Database;

// =============================================================================
// Helpers
// =============================================================================

const MOCK_REPLY: &str = "Mocked answer grounded in the excerpts.";

/// Create a fresh AppState with an in-memory DB and mock services.
fn make_state() -> (AppState, tempfile::TempDir) {
    let upload_dir = tempfile::tempdir().unwrap();
    let state = AppState::new(
        DossierConfig::default(),
        Arc::new(Database::in_memory().unwrap()),
        Arc::new(VectorIndex::new()),
        Arc::new(MockEmbedding::new()),
        Arc::new(MockGeneration::new(MOCK_REPLY)),
        upload_dir.path().to_path_buf(),
    );
    (state, upload_dir)
}

fn make_app() -> (axum::Router, tempfile::TempDir) {
    let (state, dir) = make_state();
    (create_router(state), dir)
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::delete(uri).body(Body::empty()).unwrap()
}

/// Build a single-file multipart request body.
fn multipart_upload(
    uri: &str,
    filename: &str,
    content_type: &str,
    data: &[u8],
) -> Request<Body> {
    let boundary = "dossier-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::post(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 10 * 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), 10 * 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Create a thread via the API and return its id.
async fn create_thread(app: &axum::Router) -> Uuid {
    let resp = app
        .clone()
        .oneshot(post_empty("/threads?name=Test+Thread&owner_id=user-1"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    json["thread_id"].as_str().unwrap().parse().unwrap()
}

/// Upload a plain-text document into a thread.
async fn upload_text(app: &axum::Router, thread_id: Uuid, text: &str) -> Value {
    let resp = app
        .clone()
        .oneshot(multipart_upload(
            &format!("/documents/upload?thread_id={}", thread_id),
            "notes.txt",
            "text/plain",
            text.as_bytes(),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let (app, _dir) = make_app();
    let resp = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["indexed_passages"], 0);
}

// =============================================================================
// Threads
// =============================================================================

#[tokio::test]
async fn test_create_and_list_threads() {
    let (app, _dir) = make_app();
    let id = create_thread(&app).await;

    let resp = app.clone().oneshot(get("/threads?owner_id=user-1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    let list = json.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["thread_id"].as_str().unwrap(), id.to_string());
    assert_eq!(list[0]["name"], "Test Thread");
}

#[tokio::test]
async fn test_list_threads_other_owner_empty() {
    let (app, _dir) = make_app();
    create_thread(&app).await;
    let resp = app.oneshot(get("/threads?owner_id=somebody-else")).await.unwrap();
    let json = body_json(resp).await;
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_thread() {
    let (app, _dir) = make_app();
    let id = create_thread(&app).await;

    let resp = app
        .clone()
        .oneshot(delete(&format!("/threads/{}", id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Second delete is a 404.
    let resp = app
        .oneshot(delete(&format!("/threads/{}", id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_thread_messages_unknown_thread() {
    let (app, _dir) = make_app();
    let resp = app
        .oneshot(get(&format!("/threads/{}/messages", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Chat
// =============================================================================

#[tokio::test]
async fn test_chat_without_document_advises_upload() {
    let (app, _dir) = make_app();
    let id = create_thread(&app).await;

    let resp = app
        .clone()
        .oneshot(post_json(
            "/chat/send",
            &format!(r#"{{"thread_id":"{}","message":"what is the warranty?"}}"#, id),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["mode"], "no_document");
    assert!(json["reply"].as_str().unwrap().contains("Upload a document"));

    // Both sides of the turn are persisted.
    let resp = app
        .oneshot(get(&format!("/threads/{}/messages", id)))
        .await
        .unwrap();
    let json = body_json(resp).await;
    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "assistant");
}

#[tokio::test]
async fn test_chat_unknown_thread_is_404() {
    let (app, _dir) = make_app();
    let resp = app
        .oneshot(post_json(
            "/chat/send",
            &format!(r#"{{"thread_id":"{}","message":"hello"}}"#, Uuid::new_v4()),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chat_empty_message_is_400() {
    let (app, _dir) = make_app();
    let id = create_thread(&app).await;
    let resp = app
        .oneshot(post_json(
            "/chat/send",
            &format!(r#"{{"thread_id":"{}","message":"   "}}"#, id),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_answers_from_uploaded_document() {
    let (app, _dir) = make_app();
    let id = create_thread(&app).await;
    upload_text(&app, id, "returns accepted within 30 days").await;

    // Identical text embeds at distance 0 with the mock embedder.
    let resp = app
        .clone()
        .oneshot(post_json(
            "/chat/send",
            &format!(
                r#"{{"thread_id":"{}","message":"returns accepted within 30 days"}}"#,
                id
            ),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["mode"], "answer_from_context");
    assert_eq!(json["reply"], MOCK_REPLY);
    let sources = json["sources"].as_array().unwrap();
    assert!(!sources.is_empty());
    assert_eq!(sources[0]["filename"], "notes.txt");
}

// =============================================================================
// Streaming
// =============================================================================

#[tokio::test]
async fn test_chat_stream_yields_chunks_and_done() {
    let (app, _dir) = make_app();
    let id = create_thread(&app).await;
    upload_text(&app, id, "the warranty lasts one year").await;

    let resp = app
        .clone()
        .oneshot(post_json(
            "/chat/stream",
            &format!(
                r#"{{"thread_id":"{}","message":"the warranty lasts one year"}}"#,
                id
            ),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = body_text(resp).await;
    assert!(body.contains("\"chunk\""));
    assert!(body.contains("\"done\":true"));

    // The concatenated reply was persisted after the stream drained.
    let resp = app
        .oneshot(get(&format!("/threads/{}/messages", id)))
        .await
        .unwrap();
    let json = body_json(resp).await;
    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages.last().unwrap()["content"], MOCK_REPLY);
}

#[tokio::test]
async fn test_chat_stream_without_document() {
    let (app, _dir) = make_app();
    let id = create_thread(&app).await;

    let resp = app
        .oneshot(post_json(
            "/chat/stream",
            &format!(r#"{{"thread_id":"{}","message":"hello"}}"#, id),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains("Upload a document"));
    assert!(body.contains("\"done\":true"));
}

// =============================================================================
// Documents
// =============================================================================

#[tokio::test]
async fn test_upload_and_list_documents() {
    let (app, _dir) = make_app();
    let id = create_thread(&app).await;

    let uploaded = upload_text(&app, id, "chapter one text for the index").await;
    assert_eq!(uploaded["filename"], "notes.txt");
    assert!(uploaded["chunks_indexed"].as_u64().unwrap() >= 1);

    let resp = app
        .oneshot(get(&format!("/documents?thread_id={}", id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["documents"][0]["filename"], "notes.txt");
}

#[tokio::test]
async fn test_upload_unsupported_type_is_400() {
    let (app, _dir) = make_app();
    let id = create_thread(&app).await;

    let resp = app
        .oneshot(multipart_upload(
            &format!("/documents/upload?thread_id={}", id),
            "photo.png",
            "image/png",
            b"\x89PNG",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_empty_document_is_422() {
    let (app, _dir) = make_app();
    let id = create_thread(&app).await;

    let resp = app
        .clone()
        .oneshot(multipart_upload(
            &format!("/documents/upload?thread_id={}", id),
            "blank.txt",
            "text/plain",
            b"   \n  ",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Nothing was recorded for the thread.
    let resp = app
        .oneshot(get(&format!("/documents?thread_id={}", id)))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["count"], 0);
}

#[tokio::test]
async fn test_upload_unknown_thread_is_404() {
    let (app, _dir) = make_app();
    let resp = app
        .oneshot(multipart_upload(
            &format!("/documents/upload?thread_id={}", Uuid::new_v4()),
            "notes.txt",
            "text/plain",
            b"content",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_document_then_chat_refuses() {
    let (app, _dir) = make_app();
    let id = create_thread(&app).await;
    let uploaded = upload_text(&app, id, "installation requires two screws").await;
    let doc_id = uploaded["document_id"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(delete(&format!("/documents/{}", doc_id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Idempotent delete: second call reports not-found.
    let resp = app
        .clone()
        .oneshot(delete(&format!("/documents/{}", doc_id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // With the document gone the thread is back to the advisory mode.
    let resp = app
        .oneshot(post_json(
            "/chat/send",
            &format!(
                r#"{{"thread_id":"{}","message":"installation requires two screws"}}"#,
                id
            ),
        ))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["mode"], "no_document");
}

#[tokio::test]
async fn test_messages_preserve_order_across_turns() {
    let (app, _dir) = make_app();
    let id = create_thread(&app).await;
    upload_text(&app, id, "alpha beta gamma delta").await;

    for message in ["alpha beta gamma delta", "second question", "third question"] {
        let resp = app
            .clone()
            .oneshot(post_json(
                "/chat/send",
                &format!(r#"{{"thread_id":"{}","message":"{}"}}"#, id, message),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = app
        .oneshot(get(&format!("/threads/{}/messages", id)))
        .await
        .unwrap();
    let json = body_json(resp).await;
    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 6);
    assert_eq!(messages[0]["content"], "alpha beta gamma delta");
    assert_eq!(messages[2]["content"], "second question");
    assert_eq!(messages[4]["content"], "third question");
    // Sequence numbers strictly increase.
    let seqs: Vec<i64> = messages.iter().map(|m| m["seq"].as_i64().unwrap()).collect();
    for pair in seqs.windows(2) {
        assert!(pair[0] < pair[1]);
    }
}
