//! Response orchestrator: the per-message state machine.
//!
//! Evaluated once per incoming message: no documents means a fixed advisory
//! reply, irrelevant retrieval means a fixed refusal, and only a usable
//! context bundle reaches the generation capability. Every mode persists the
//! user message before evaluation and an assistant turn afterwards, so the
//! conversation log never holds an unanswered user turn.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use dossier_core::error::DossierError;
use dossier_core::types::{ChatRole, ChatTurn};
use dossier_store::{Database, DocumentRepository, MessageRepository};

use crate::error::ChatError;
use crate::generation::GenerationService;
use crate::prompt::{
    assemble, build_instruction, GENERATION_FAILED_REPLY, NOT_FOUND_REPLY, NO_DOCUMENT_REPLY,
};
use crate::retrieval::{format_context, RetrievalPolicy, RetrievalResult};
use crate::streaming::StreamingReply;

/// Maximum message length in characters.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// The response path selected for one incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    NoDocument,
    NoRelevantContext,
    AnswerFromContext,
}

/// A context passage reference attached to an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: Uuid,
    pub filename: String,
    pub page: u32,
    pub distance: f64,
}

/// The result of one handled message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub reply: String,
    pub mode: ChatMode,
    pub sources: Vec<SourceRef>,
}

/// Outcome of the shared pre-generation pipeline.
enum Prepared {
    /// A fixed reply, already persisted; generation is not invoked.
    Fixed { reply: &'static str, mode: ChatMode },
    /// Context was selected; `turns` is the assembled prompt.
    Context {
        turns: Vec<ChatTurn>,
        sources: Vec<SourceRef>,
    },
}

/// Coordinates the conversation store, retrieval policy, and generation
/// capability for both batch and streaming replies.
pub struct ChatOrchestrator {
    db: Arc<Database>,
    messages: MessageRepository,
    documents: DocumentRepository,
    policy: RetrievalPolicy,
    generator: Arc<dyn GenerationService>,
    history_limit: usize,
}

impl ChatOrchestrator {
    pub fn new(
        db: Arc<Database>,
        policy: RetrievalPolicy,
        generator: Arc<dyn GenerationService>,
        history_limit: usize,
    ) -> Self {
        Self {
            messages: MessageRepository::new(Arc::clone(&db)),
            documents: DocumentRepository::new(Arc::clone(&db)),
            db,
            policy,
            generator,
            history_limit,
        }
    }

    /// Handle an incoming message and return the complete reply.
    pub async fn handle_message(
        &self,
        thread_id: Uuid,
        message: &str,
    ) -> Result<ChatOutcome, ChatError> {
        match self.prepare(thread_id, message).await? {
            Prepared::Fixed { reply, mode } => Ok(ChatOutcome {
                reply: reply.to_string(),
                mode,
                sources: Vec::new(),
            }),
            Prepared::Context { turns, sources } => {
                let reply = match self.generator.complete(&turns).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        self.persist_failure_notice(thread_id);
                        return Err(ChatError::Generation(e.to_string()));
                    }
                };
                self.messages
                    .append(thread_id, ChatRole::Assistant, &reply)?;
                Ok(ChatOutcome {
                    reply,
                    mode: ChatMode::AnswerFromContext,
                    sources,
                })
            }
        }
    }

    /// Handle an incoming message as a fragment stream.
    ///
    /// Fixed-reply modes yield their (already persisted) reply as a single
    /// fragment. The answer-from-context mode forwards generation fragments
    /// and persists the concatenated reply once the stream is exhausted.
    pub async fn handle_message_stream(
        &self,
        thread_id: Uuid,
        message: &str,
    ) -> Result<StreamingReply, ChatError> {
        match self.prepare(thread_id, message).await? {
            Prepared::Fixed { reply, mode } => Ok(StreamingReply::fixed(reply, mode)),
            Prepared::Context { turns, sources: _ } => {
                let stream = match self.generator.stream(&turns).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        self.persist_failure_notice(thread_id);
                        return Err(ChatError::Generation(e.to_string()));
                    }
                };
                Ok(StreamingReply::generated(
                    stream,
                    MessageRepository::new(Arc::clone(&self.db)),
                    thread_id,
                ))
            }
        }
    }

    // -- Private helpers --

    /// Shared pipeline: validate, persist the user message, select the mode,
    /// and (for the context mode) assemble the prompt.
    async fn prepare(&self, thread_id: Uuid, message: &str) -> Result<Prepared, ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if message.len() > MAX_MESSAGE_LENGTH {
            return Err(ChatError::MessageTooLong(MAX_MESSAGE_LENGTH));
        }

        // Persist the user message before evaluation; ordering holds even
        // when generation is skipped.
        self.messages.append(thread_id, ChatRole::User, message)?;

        if self.documents.count_for_thread(thread_id)? == 0 {
            self.messages
                .append(thread_id, ChatRole::Assistant, NO_DOCUMENT_REPLY)?;
            return Ok(Prepared::Fixed {
                reply: NO_DOCUMENT_REPLY,
                mode: ChatMode::NoDocument,
            });
        }

        let retrieval = match self.policy.retrieve(thread_id, message).await {
            Ok(result) => result,
            // A broken index degrades to "no context found": refusing to
            // answer is safer than failing the whole request.
            Err(DossierError::IndexUnavailable(e)) | Err(DossierError::Embedding(e)) => {
                warn!(thread_id = %thread_id, error = %e, "Retrieval degraded to no-context");
                RetrievalResult {
                    passages: Vec::new(),
                    used: false,
                }
            }
            Err(e) => return Err(e.into()),
        };

        if !retrieval.used {
            self.messages
                .append(thread_id, ChatRole::Assistant, NOT_FOUND_REPLY)?;
            return Ok(Prepared::Fixed {
                reply: NOT_FOUND_REPLY,
                mode: ChatMode::NoRelevantContext,
            });
        }

        let context = format_context(&retrieval.passages);
        let instruction = build_instruction(&context);
        let history = self.messages.history(thread_id, self.history_limit)?;
        let turns = assemble(&instruction, &history);

        let sources = retrieval
            .passages
            .iter()
            .map(|sp| SourceRef {
                document_id: sp.passage.document_id,
                filename: sp.passage.filename.clone(),
                page: sp.passage.page,
                distance: sp.distance,
            })
            .collect();

        Ok(Prepared::Context { turns, sources })
    }

    /// Persist the fixed failure notice so the user turn is not left
    /// without an assistant turn.
    fn persist_failure_notice(&self, thread_id: Uuid) {
        if let Err(e) = self
            .messages
            .append(thread_id, ChatRole::Assistant, GENERATION_FAILED_REPLY)
        {
            warn!(thread_id = %thread_id, error = %e, "Failed to persist failure notice");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
