//! Streaming reply wrapper.
//!
//! `StreamingReply` forwards generation fragments to its consumer as they
//! arrive, accumulates the full text, and persists the assistant turn only
//! once the inner stream is exhausted. A persistence failure after a
//! delivered stream surfaces as a distinguishable terminal error, since the
//! user has already seen the unpersisted answer. Dropping the stream early
//! (client disconnect) persists whatever was accumulated, logged as
//! incomplete.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tracing::{error, warn};
use uuid::Uuid;

use dossier_core::types::ChatRole;
use dossier_store::MessageRepository;

use crate::error::ChatError;
use crate::generation::TokenStream;
use crate::orchestrator::ChatMode;
use crate::prompt::GENERATION_FAILED_REPLY;

enum Inner {
    /// A fixed reply, already persisted by the orchestrator.
    Fixed(Option<String>),
    /// A live generation stream, persisted on exhaustion (or drop).
    Generated {
        stream: TokenStream,
        messages: MessageRepository,
        thread_id: Uuid,
        accumulated: String,
        done: bool,
        /// Persistence was attempted (successfully or not); guards against
        /// a second attempt from Drop.
        persisted: bool,
    },
}

/// A reply delivered as a fragment stream.
///
/// Single-producer/single-consumer and non-restartable; the transport layer
/// forwards each fragment as it arrives.
pub struct StreamingReply {
    mode: ChatMode,
    inner: Inner,
}

impl std::fmt::Debug for StreamingReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingReply")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl StreamingReply {
    /// Wrap an already-persisted fixed reply as a one-fragment stream.
    pub(crate) fn fixed(reply: &str, mode: ChatMode) -> Self {
        Self {
            mode,
            inner: Inner::Fixed(Some(reply.to_string())),
        }
    }

    /// Wrap a live generation stream.
    pub(crate) fn generated(
        stream: TokenStream,
        messages: MessageRepository,
        thread_id: Uuid,
    ) -> Self {
        Self {
            mode: ChatMode::AnswerFromContext,
            inner: Inner::Generated {
                stream,
                messages,
                thread_id,
                accumulated: String::new(),
                done: false,
                persisted: false,
            },
        }
    }

    /// The mode the orchestrator selected for this reply.
    pub fn mode(&self) -> ChatMode {
        self.mode
    }
}

impl Stream for StreamingReply {
    type Item = Result<String, ChatError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Fixed(reply) => Poll::Ready(reply.take().map(Ok)),
            Inner::Generated {
                stream,
                messages,
                thread_id,
                accumulated,
                done,
                persisted,
            } => {
                if *done {
                    return Poll::Ready(None);
                }
                match stream.as_mut().poll_next(cx) {
                    Poll::Pending => Poll::Pending,
                    Poll::Ready(Some(Ok(fragment))) => {
                        accumulated.push_str(&fragment);
                        Poll::Ready(Some(Ok(fragment)))
                    }
                    Poll::Ready(Some(Err(e))) => {
                        // Generation failed mid-stream. Persist what the
                        // user has already seen, or the fixed failure
                        // notice when nothing arrived, so the user turn
                        // does not dangle.
                        *done = true;
                        *persisted = true;
                        let content: &str = if accumulated.is_empty() {
                            GENERATION_FAILED_REPLY
                        } else {
                            accumulated.as_str()
                        };
                        if let Err(pe) =
                            messages.append(*thread_id, ChatRole::Assistant, content)
                        {
                            error!(
                                thread_id = %thread_id,
                                error = %pe,
                                "Failed to persist reply after stream error"
                            );
                        }
                        Poll::Ready(Some(Err(ChatError::from(e))))
                    }
                    Poll::Ready(None) => {
                        *done = true;
                        *persisted = true;
                        match messages.append(*thread_id, ChatRole::Assistant, accumulated) {
                            Ok(_) => Poll::Ready(None),
                            Err(e) => Poll::Ready(Some(Err(ChatError::Storage(format!(
                                "reply was delivered but could not be persisted: {}",
                                e
                            ))))),
                        }
                    }
                }
            }
        }
    }
}

impl Drop for StreamingReply {
    fn drop(&mut self) {
        if let Inner::Generated {
            messages,
            thread_id,
            accumulated,
            persisted,
            ..
        } = &mut self.inner
        {
            if !*persisted && !accumulated.is_empty() {
                warn!(
                    thread_id = %thread_id,
                    chars = accumulated.len(),
                    "Stream dropped before completion; persisting partial reply"
                );
                if let Err(e) = messages.append(*thread_id, ChatRole::Assistant, accumulated) {
                    error!(
                        thread_id = %thread_id,
                        error = %e,
                        "Failed to persist partial reply"
                    );
                }
                *persisted = true;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
