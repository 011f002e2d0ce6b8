//! Document ingestion pipeline.
//!
//! Embeds chunked passages and dual-writes them: durable rows in the
//! passages table first, then vectors in the in-memory index. Rejects
//! empty documents before anything is written, so a failed upload leaves
//! no partial state.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use dossier_core::error::DossierError;
use dossier_core::types::{DocumentRecord, Passage};
use dossier_store::{Database, DocumentRepository, PassageRepository};

use crate::chunk::ChunkedText;
use crate::embedding::DynEmbeddingService;
use crate::index::VectorIndex;

/// Embeds and stores document passages; removes them on delete.
pub struct IndexPipeline {
    index: Arc<VectorIndex>,
    documents: DocumentRepository,
    passages: PassageRepository,
    embedder: Arc<dyn DynEmbeddingService>,
}

impl IndexPipeline {
    pub fn new(
        index: Arc<VectorIndex>,
        db: Arc<Database>,
        embedder: Arc<dyn DynEmbeddingService>,
    ) -> Self {
        Self {
            index,
            documents: DocumentRepository::new(Arc::clone(&db)),
            passages: PassageRepository::new(db),
            embedder,
        }
    }

    /// Index a chunked document for a thread.
    ///
    /// Embeds every chunk, persists the document metadata and passage rows
    /// in one transaction, then inserts the vectors. Returns the stored
    /// metadata record.
    pub async fn index_document(
        &self,
        thread_id: Uuid,
        document_id: Uuid,
        filename: &str,
        storage_path: &str,
        chunks: &[ChunkedText],
    ) -> Result<DocumentRecord, DossierError> {
        if chunks.is_empty() {
            return Err(DossierError::EmptyDocument(filename.to_string()));
        }

        let mut passages = Vec::with_capacity(chunks.len());
        let mut embeddings = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding = self.embedder.embed_boxed(&chunk.content).await?;
            passages.push(Passage {
                id: Uuid::new_v4(),
                document_id,
                thread_id,
                filename: filename.to_string(),
                page: chunk.page,
                content: chunk.content.clone(),
            });
            embeddings.push(embedding);
        }

        let record = DocumentRecord {
            id: document_id,
            thread_id,
            filename: filename.to_string(),
            storage_path: storage_path.to_string(),
            chunk_count: passages.len(),
            uploaded_at: Utc::now(),
        };

        // Durable rows first; the in-memory index can always be rebuilt.
        self.documents
            .insert_with_passages(&record, &passages, &embeddings)?;

        for (passage, embedding) in passages.into_iter().zip(embeddings.into_iter()) {
            self.index.insert(passage, embedding)?;
        }

        info!(
            document_id = %document_id,
            thread_id = %thread_id,
            chunks = record.chunk_count,
            "Document indexed"
        );
        Ok(record)
    }

    /// Delete a document: metadata and passage rows in one transaction,
    /// then its vectors.
    ///
    /// A vector-delete failure leaves orphaned vectors behind; that is
    /// logged and tolerated, whereas orphaned metadata would not be.
    pub fn remove_document(&self, document_id: Uuid) -> Result<DocumentRecord, DossierError> {
        let record = self
            .documents
            .delete(document_id)?
            .ok_or(DossierError::DocumentNotFound(document_id))?;

        match self.index.delete_by_document(document_id) {
            Ok(removed) => {
                info!(document_id = %document_id, removed, "Document vectors removed");
            }
            Err(e) => {
                warn!(
                    document_id = %document_id,
                    error = %e,
                    "Vector delete failed; orphaned vectors remain until rebuild"
                );
            }
        }

        Ok(record)
    }

    /// Rebuild the in-memory index from persisted passages.
    ///
    /// Called once at startup. Returns the number of passages loaded.
    pub fn rebuild(&self) -> Result<usize, DossierError> {
        let rows = self.passages.load_all()?;
        let count = rows.len();
        for (passage, embedding) in rows {
            self.index.insert(passage, embedding)?;
        }
        info!(passages = count, "Vector index rebuilt from storage");
        Ok(count)
    }

    /// Get a reference to the underlying vector index.
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}
