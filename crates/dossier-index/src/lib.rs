//! Document index: extraction, chunking, embedding, and thread-scoped
//! similarity search.
//!
//! Passages are persisted through dossier-store (so the index can be rebuilt
//! on startup) and searched through the in-memory [`index::VectorIndex`].

pub mod chunk;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod pipeline;

pub use chunk::{chunk_pages, ChunkedText};
pub use extract::{DocumentKind, PageText};
pub use index::VectorIndex;
pub use pipeline::IndexPipeline;
