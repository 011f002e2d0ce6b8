//! Retrieval policy: turns a user query into a relevance-filtered context
//! bundle, or a "no relevant context" signal.
//!
//! The threshold/fallback behavior is a deliberate precision/recall trade:
//! when documents exist and the index returned candidates, a possibly-loose
//! answer beats an unconditional refusal. The fallback is configurable
//! because threshold calibration depends on the embedding model.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use dossier_core::config::RetrievalConfig;
use dossier_core::error::DossierError;
use dossier_core::types::ScoredPassage;
use dossier_index::embedding::DynEmbeddingService;
use dossier_index::VectorIndex;
use dossier_store::{Database, DocumentRepository};

/// Outcome of a retrieval attempt.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// Selected context passages, best first. Empty when `used` is false.
    pub passages: Vec<ScoredPassage>,
    /// Whether the passages should be used as answer context.
    pub used: bool,
}

impl RetrievalResult {
    fn none() -> Self {
        Self {
            passages: Vec::new(),
            used: false,
        }
    }
}

/// Relevance-filtered retrieval over the document index.
pub struct RetrievalPolicy {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn DynEmbeddingService>,
    documents: DocumentRepository,
    config: RetrievalConfig,
}

impl RetrievalPolicy {
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn DynEmbeddingService>,
        db: Arc<Database>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            documents: DocumentRepository::new(db),
            config,
        }
    }

    /// Retrieve context passages for a query, scoped to one thread.
    ///
    /// Threads with no documents short-circuit without touching the
    /// embedder or the index.
    pub async fn retrieve(
        &self,
        thread_id: Uuid,
        query: &str,
    ) -> Result<RetrievalResult, DossierError> {
        if self.documents.count_for_thread(thread_id)? == 0 {
            debug!(thread_id = %thread_id, "No documents; skipping vector search");
            return Ok(RetrievalResult::none());
        }

        let query_vec = self.embedder.embed_boxed(query).await?;
        let candidates = self
            .index
            .search(thread_id, &query_vec, self.config.top_k)?;

        if candidates.is_empty() {
            debug!(thread_id = %thread_id, "Index returned no candidates");
            return Ok(RetrievalResult::none());
        }

        let relevant: Vec<ScoredPassage> = candidates
            .iter()
            .filter(|p| p.distance <= self.config.max_distance)
            .cloned()
            .collect();

        if !relevant.is_empty() {
            debug!(
                thread_id = %thread_id,
                candidates = candidates.len(),
                relevant = relevant.len(),
                "Retrieved context passed threshold"
            );
            return Ok(RetrievalResult {
                passages: relevant,
                used: true,
            });
        }

        if self.config.fallback_to_top_k {
            debug!(
                thread_id = %thread_id,
                candidates = candidates.len(),
                max_distance = self.config.max_distance,
                "No candidate passed threshold; falling back to top-k"
            );
            return Ok(RetrievalResult {
                passages: candidates,
                used: true,
            });
        }

        debug!(thread_id = %thread_id, "No candidate passed threshold; fallback disabled");
        Ok(RetrievalResult::none())
    }
}

/// Format selected passages for prompt injection, with source filename and
/// page number per passage.
pub fn format_context(passages: &[ScoredPassage]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, sp)| {
            format!(
                "[Source {} - {}, page {}]\n{}",
                i + 1,
                sp.passage.filename,
                sp.passage.page,
                sp.passage.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
