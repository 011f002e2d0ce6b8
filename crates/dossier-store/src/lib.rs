//! SQLite-backed conversation store: threads, messages, documents, and
//! persisted passages.
//!
//! All durable state lives here so the service survives process restarts;
//! the vector index is rebuilt from the `passages` table on startup.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{
    DocumentRepository, MessageRepository, PassageRepository, ThreadRepository,
};
