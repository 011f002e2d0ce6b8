//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, and all endpoint
//! handlers.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // CORS: allow localhost origins for the web client. The configured port
    // plus port+1 covers the dev server.
    let port = state.config.general.port;
    let dev_port = port.saturating_add(1);
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([
            format!("http://127.0.0.1:{}", port)
                .parse::<HeaderValue>()
                .unwrap(),
            format!("http://localhost:{}", port)
                .parse::<HeaderValue>()
                .unwrap(),
            format!("http://127.0.0.1:{}", dev_port)
                .parse::<HeaderValue>()
                .unwrap(),
            format!("http://localhost:{}", dev_port)
                .parse::<HeaderValue>()
                .unwrap(),
        ]))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    // Uploads get a larger body limit than the JSON endpoints.
    let upload_limit = (state.config.upload.max_size_mb as usize + 1) * 1024 * 1024;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/chat/send", post(handlers::send_chat))
        .route("/chat/stream", post(handlers::stream_chat))
        .route(
            "/threads",
            post(handlers::create_thread).get(handlers::list_threads),
        )
        .route("/threads/{id}/messages", get(handlers::thread_messages))
        .route("/threads/{id}", delete(handlers::delete_thread))
        .route(
            "/documents/upload",
            post(handlers::upload_document).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/documents", get(handlers::list_documents))
        .route("/documents/{id}", delete(handlers::delete_document))
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB for JSON endpoints
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured address.
///
/// Binds to 127.0.0.1 (localhost only) on the port from config.
pub async fn start_server(state: AppState) -> Result<(), dossier_core::error::DossierError> {
    let port = state.config.general.port;
    let addr = format!("127.0.0.1:{}", port);

    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| dossier_core::error::DossierError::Api(format!("Failed to bind: {}", e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| dossier_core::error::DossierError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
