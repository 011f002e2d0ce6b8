//! Application state shared across all route handlers.
//!
//! AppState holds references to all services and shared resources. It is
//! passed to handlers via axum's State extractor.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use dossier_chat::generation::GenerationService;
use dossier_chat::retrieval::RetrievalPolicy;
use dossier_chat::ChatOrchestrator;
use dossier_core::config::DossierConfig;
use dossier_index::embedding::DynEmbeddingService;
use dossier_index::{IndexPipeline, VectorIndex};
use dossier_store::Database;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (read-only after startup).
    pub config: Arc<DossierConfig>,
    /// SQLite conversation store.
    pub database: Arc<Database>,
    /// In-memory vector index over document passages.
    pub index: Arc<VectorIndex>,
    /// Document ingestion pipeline (chunk rows + vectors).
    pub pipeline: Arc<IndexPipeline>,
    /// Chat orchestrator (mode selection, prompt assembly, generation).
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Directory for original upload bytes.
    pub upload_dir: PathBuf,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Wire up the full service graph from its leaf components.
    pub fn new(
        config: DossierConfig,
        database: Arc<Database>,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn DynEmbeddingService>,
        generator: Arc<dyn GenerationService>,
        upload_dir: PathBuf,
    ) -> Self {
        let pipeline = Arc::new(IndexPipeline::new(
            Arc::clone(&index),
            Arc::clone(&database),
            Arc::clone(&embedder),
        ));
        let policy = RetrievalPolicy::new(
            Arc::clone(&index),
            embedder,
            Arc::clone(&database),
            config.retrieval.clone(),
        );
        let orchestrator = Arc::new(ChatOrchestrator::new(
            Arc::clone(&database),
            policy,
            generator,
            config.retrieval.history_limit,
        ));

        Self {
            config: Arc::new(config),
            database,
            index,
            pipeline,
            orchestrator,
            upload_dir,
            start_time: Instant::now(),
        }
    }
}
