//! HTTP boundary: axum routes over the chat orchestrator, document
//! pipeline, and conversation store.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
