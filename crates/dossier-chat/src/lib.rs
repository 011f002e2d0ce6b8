//! Retrieval policy and response orchestration.
//!
//! The orchestrator is a small state machine over three resources: the
//! conversation store, the document index, and the generation capability.
//! Per incoming message it selects a mode (no document / no relevant
//! context / answer from context), assembles a constrained prompt, and
//! persists both sides of the turn.

pub mod error;
pub mod generation;
pub mod orchestrator;
pub mod prompt;
pub mod retrieval;
pub mod streaming;

pub use error::ChatError;
pub use generation::{GenerationService, HttpGenerationService, MockGeneration, TokenStream};
pub use orchestrator::{ChatMode, ChatOrchestrator, ChatOutcome, SourceRef};
pub use retrieval::{RetrievalPolicy, RetrievalResult};
pub use streaming::StreamingReply;
