//! In-memory vector index with brute-force cosine-distance search.
//!
//! Simple but correct: all operations are O(n) for search, which is
//! acceptable for per-thread document sets. Search is scoped by thread
//! before ranking, so one thread's passages can never surface in another
//! thread's results. Durable copies of every entry live in the passages
//! table; the index is rebuilt from them on startup.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use dossier_core::error::DossierError;
use dossier_core::types::{Passage, ScoredPassage};

/// An entry stored in the vector index.
#[derive(Debug, Clone)]
struct VectorEntry {
    passage: Passage,
    embedding: Vec<f32>,
    /// Insertion order, used as a deterministic tie-break.
    ord: u64,
}

#[derive(Debug, Default)]
struct IndexState {
    entries: HashMap<Uuid, VectorEntry>,
    next_ord: u64,
}

/// In-memory vector index using brute-force cosine distance.
///
/// Thread-safe via interior RwLock; clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    state: Arc<RwLock<IndexState>>,
}

impl VectorIndex {
    /// Create a new empty vector index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a passage with its embedding.
    ///
    /// Overwrites any existing entry with the same passage ID.
    pub fn insert(&self, passage: Passage, embedding: Vec<f32>) -> Result<(), DossierError> {
        let mut state = self
            .state
            .write()
            .map_err(|e| DossierError::IndexUnavailable(format!("lock poisoned: {}", e)))?;
        let ord = state.next_ord;
        state.next_ord += 1;
        state.entries.insert(
            passage.id,
            VectorEntry {
                passage,
                embedding,
                ord,
            },
        );
        Ok(())
    }

    /// Search for the `k` nearest passages of one thread by cosine distance
    /// (lower = more similar). Ties break by insertion order.
    ///
    /// A thread with no indexed passages yields an empty result, not an
    /// error.
    pub fn search(
        &self,
        thread_id: Uuid,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredPassage>, DossierError> {
        let state = self
            .state
            .read()
            .map_err(|e| DossierError::IndexUnavailable(format!("lock poisoned: {}", e)))?;

        let mut scored: Vec<(f64, u64, ScoredPassage)> = state
            .entries
            .values()
            .filter(|entry| entry.passage.thread_id == thread_id)
            .map(|entry| {
                let distance = 1.0 - cosine_similarity(query, &entry.embedding);
                (
                    distance,
                    entry.ord,
                    ScoredPassage {
                        passage: entry.passage.clone(),
                        distance,
                    },
                )
            })
            .collect();

        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, _, sp)| sp).collect())
    }

    /// Remove all passages of one document.
    ///
    /// Idempotent: an unknown document id removes nothing and is not an
    /// error. Returns the number of entries removed.
    pub fn delete_by_document(&self, document_id: Uuid) -> Result<usize, DossierError> {
        let mut state = self
            .state
            .write()
            .map_err(|e| DossierError::IndexUnavailable(format!("lock poisoned: {}", e)))?;
        let before = state.entries.len();
        state
            .entries
            .retain(|_, entry| entry.passage.document_id != document_id);
        Ok(before - state.entries.len())
    }

    /// Number of passages currently indexed.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    /// True when no passages are indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of passages indexed for a thread.
    pub fn count_for_thread(&self, thread_id: Uuid) -> usize {
        self.state
            .read()
            .map(|s| {
                s.entries
                    .values()
                    .filter(|e| e.passage.thread_id == thread_id)
                    .count()
            })
            .unwrap_or(0)
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or lengths differ.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_passage(thread_id: Uuid, document_id: Uuid, content: &str) -> Passage {
        Passage {
            id: Uuid::new_v4(),
            document_id,
            thread_id,
            filename: "manual.pdf".to_string(),
            page: 1,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_insert_and_search() {
        let index = VectorIndex::new();
        let thread = Uuid::new_v4();
        let doc = Uuid::new_v4();

        index
            .insert(make_passage(thread, doc, "warranty"), vec![1.0, 0.0])
            .unwrap();
        index
            .insert(make_passage(thread, doc, "returns"), vec![0.0, 1.0])
            .unwrap();

        let hits = index.search(thread, &[1.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].passage.content, "warranty");
        assert!(hits[0].distance < 1e-9);
        assert!(hits[1].distance > 0.9);
    }

    #[test]
    fn test_search_scoped_to_thread() {
        let index = VectorIndex::new();
        let thread_a = Uuid::new_v4();
        let thread_b = Uuid::new_v4();
        let doc = Uuid::new_v4();

        // B's content is a perfect match for the query; it must still never
        // appear in A's results.
        index
            .insert(make_passage(thread_b, doc, "exact match"), vec![1.0, 0.0])
            .unwrap();
        index
            .insert(make_passage(thread_a, doc, "loose match"), vec![0.5, 0.5])
            .unwrap();

        let hits = index.search(thread_a, &[1.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].passage.thread_id, thread_a);
        assert_eq!(hits[0].passage.content, "loose match");
    }

    #[test]
    fn test_search_unindexed_thread_empty() {
        let index = VectorIndex::new();
        let hits = index.search(Uuid::new_v4(), &[1.0, 0.0], 5).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_search_respects_k() {
        let index = VectorIndex::new();
        let thread = Uuid::new_v4();
        let doc = Uuid::new_v4();
        for i in 0..10 {
            index
                .insert(
                    make_passage(thread, doc, &format!("p{}", i)),
                    vec![1.0, i as f32 * 0.01],
                )
                .unwrap();
        }
        let hits = index.search(thread, &[1.0, 0.0], 3).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_equal_distance_ties_break_by_insertion_order() {
        let index = VectorIndex::new();
        let thread = Uuid::new_v4();
        let doc = Uuid::new_v4();
        let first = make_passage(thread, doc, "first");
        let second = make_passage(thread, doc, "second");

        // Identical embeddings: identical distances.
        index.insert(first, vec![1.0, 0.0]).unwrap();
        index.insert(second, vec![1.0, 0.0]).unwrap();

        let hits = index.search(thread, &[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].passage.content, "first");
        assert_eq!(hits[1].passage.content, "second");
    }

    #[test]
    fn test_delete_by_document() {
        let index = VectorIndex::new();
        let thread = Uuid::new_v4();
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();

        index
            .insert(make_passage(thread, doc_a, "a1"), vec![1.0, 0.0])
            .unwrap();
        index
            .insert(make_passage(thread, doc_a, "a2"), vec![0.0, 1.0])
            .unwrap();
        index
            .insert(make_passage(thread, doc_b, "b1"), vec![1.0, 1.0])
            .unwrap();

        let removed = index.delete_by_document(doc_a).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(index.len(), 1);

        let hits = index.search(thread, &[1.0, 0.0], 10).unwrap();
        assert!(hits.iter().all(|h| h.passage.document_id == doc_b));
    }

    #[test]
    fn test_delete_unknown_document_is_noop() {
        let index = VectorIndex::new();
        assert_eq!(index.delete_by_document(Uuid::new_v4()).unwrap(), 0);
        // A second call behaves identically.
        assert_eq!(index.delete_by_document(Uuid::new_v4()).unwrap(), 0);
    }

    #[test]
    fn test_round_trip_index_then_delete() {
        let index = VectorIndex::new();
        assert!(index.is_empty());
        let thread = Uuid::new_v4();
        let doc = Uuid::new_v4();
        for i in 0..4 {
            index
                .insert(
                    make_passage(thread, doc, &format!("p{}", i)),
                    vec![1.0, i as f32],
                )
                .unwrap();
        }
        index.delete_by_document(doc).unwrap();
        assert!(index.search(thread, &[1.0, 0.0], 10).unwrap().is_empty());
        assert_eq!(index.count_for_thread(thread), 0);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0f32; 100];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let mut a = vec![0.0f32; 100];
        let mut b = vec![0.0f32; 100];
        a[0] = 1.0;
        b[1] = 1.0;
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        assert_eq!(cosine_similarity(&[1.0; 10], &[1.0; 20]), 0.0);
    }

    #[test]
    fn test_insert_overwrites_same_id() {
        let index = VectorIndex::new();
        let thread = Uuid::new_v4();
        let doc = Uuid::new_v4();
        let mut passage = make_passage(thread, doc, "v1");
        let id = passage.id;
        index.insert(passage.clone(), vec![1.0, 0.0]).unwrap();
        passage.content = "v2".to_string();
        passage.id = id;
        index.insert(passage, vec![0.0, 1.0]).unwrap();
        assert_eq!(index.len(), 1);
    }
}
