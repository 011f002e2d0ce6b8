//! Prompt assembly for context-bound answering.
//!
//! Each turn gets a freshly-scoped system instruction reflecting the current
//! retrieval; history reads never include system rows, so stale instructions
//! from earlier turns are stripped automatically.

use dossier_core::types::{ChatRole, ChatTurn, MessageRecord};

/// Fixed advisory reply when a thread has no documents.
pub const NO_DOCUMENT_REPLY: &str =
    "No document is attached to this conversation yet. \
     Upload a document and I will answer questions about its contents.";

/// Fixed refusal reply when retrieval finds no relevant context, and the
/// exact sentence the model is instructed to emit when it judges the
/// provided context insufficient.
pub const NOT_FOUND_REPLY: &str =
    "I could not find the answer to that in the uploaded document.";

/// Fixed assistant turn persisted when the generation capability fails, so
/// the user message never dangles without a reply.
pub const GENERATION_FAILED_REPLY: &str =
    "Something went wrong while generating a reply. Please try again.";

/// Build the restrictive system instruction around retrieved context.
///
/// The directive embeds the passages verbatim, forbids outside knowledge,
/// mandates the exact refusal sentence for insufficient context, and
/// forbids apology or speculation.
pub fn build_instruction(context: &str) -> String {
    format!(
        "You are an assistant that answers questions about uploaded documents.\n\
         Follow these rules without exception:\n\
         - Answer using only the document excerpts below. Never use outside knowledge.\n\
         - If the excerpts do not contain the answer, reply with exactly this sentence: \
         \"{refusal}\"\n\
         - Do not apologize and do not speculate beyond the excerpts.\n\n\
         === DOCUMENT EXCERPTS ===\n\
         {context}\n\
         =========================",
        refusal = NOT_FOUND_REPLY,
        context = context,
    )
}

/// Assemble the generation message sequence: the fresh instruction, then
/// prior user/assistant turns oldest first. The history tail is the current
/// user message (persisted before retrieval runs).
pub fn assemble(instruction: &str, history: &[MessageRecord]) -> Vec<ChatTurn> {
    let mut turns = Vec::with_capacity(history.len() + 1);
    turns.push(ChatTurn::system(instruction));
    for record in history {
        // History reads exclude system rows; keep the filter anyway so a
        // caller passing a raw message list cannot leak stale instructions.
        if record.role == ChatRole::System {
            continue;
        }
        turns.push(ChatTurn {
            role: record.role,
            content: record.content.clone(),
        });
    }
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(seq: i64, role: ChatRole, content: &str) -> MessageRecord {
        MessageRecord {
            seq,
            thread_id: Uuid::nil(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_instruction_embeds_context_verbatim() {
        let context = "[Source 1 - manual.pdf, page 2]\nReturns within 30 days.";
        let instruction = build_instruction(context);
        assert!(instruction.contains(context));
        assert!(instruction.contains(NOT_FOUND_REPLY));
        assert!(instruction.contains("Never use outside knowledge"));
        assert!(instruction.contains("Do not apologize"));
    }

    #[test]
    fn test_assemble_starts_with_system_turn() {
        let history = vec![record(1, ChatRole::User, "hello")];
        let turns = assemble("instruction", &history);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, ChatRole::System);
        assert_eq!(turns[0].content, "instruction");
        assert_eq!(turns[1].role, ChatRole::User);
    }

    #[test]
    fn test_assemble_preserves_history_order() {
        let history = vec![
            record(1, ChatRole::User, "first"),
            record(2, ChatRole::Assistant, "second"),
            record(3, ChatRole::User, "third"),
        ];
        let turns = assemble("i", &history);
        assert_eq!(turns[1].content, "first");
        assert_eq!(turns[2].content, "second");
        assert_eq!(turns[3].content, "third");
    }

    #[test]
    fn test_assemble_strips_system_rows() {
        let history = vec![
            record(1, ChatRole::System, "stale instruction"),
            record(2, ChatRole::User, "question"),
        ];
        let turns = assemble("fresh instruction", &history);
        assert_eq!(turns.len(), 2);
        assert!(turns.iter().all(|t| t.content != "stale instruction"));
        assert_eq!(
            turns
                .iter()
                .filter(|t| t.role == ChatRole::System)
                .count(),
            1
        );
    }

    #[test]
    fn test_fixed_replies_are_distinct() {
        assert_ne!(NO_DOCUMENT_REPLY, NOT_FOUND_REPLY);
        assert_ne!(NOT_FOUND_REPLY, GENERATION_FAILED_REPLY);
    }
}
