//! Core domain types shared across the workspace.
//!
//! Conversation state flows through the pipeline as immutable values: the
//! orchestrator hands each stage a snapshot and receives a new value back,
//! rather than threading a shared mutable conversation object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DossierError;

/// Role of a conversation message.
///
/// A tagged variant rather than a runtime type check: storage rejects any
/// role string outside this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    /// The canonical lowercase string stored in SQLite and sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }

    /// Parse a stored role string. Unknown roles are rejected rather than
    /// silently coerced.
    pub fn parse(s: &str) -> Result<Self, DossierError> {
        match s {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            "system" => Ok(ChatRole::System),
            other => Err(DossierError::Storage(format!("unknown role: {}", other))),
        }
    }
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: Uuid,
    /// Passthrough owner identifier; not an access-control boundary.
    pub owner_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted conversation message.
///
/// `seq` is assigned by the store on insert and strictly increases within a
/// thread; insertion order defines conversation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub seq: i64,
    pub thread_id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Metadata for an uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub filename: String,
    /// Where the original upload bytes were written.
    pub storage_path: String,
    pub chunk_count: usize,
    pub uploaded_at: DateTime<Utc>,
}

/// A chunk of extracted document text, owned by the document index.
///
/// Invariant: `thread_id` always matches the parent document's thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub id: Uuid,
    pub document_id: Uuid,
    pub thread_id: Uuid,
    pub filename: String,
    /// 1-based page number in the source document.
    pub page: u32,
    pub content: String,
}

/// A passage returned from similarity search with its distance score
/// (lower = more similar).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub distance: f64,
}

/// A single turn handed to the generation capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in [ChatRole::User, ChatRole::Assistant, ChatRole::System] {
            assert_eq!(ChatRole::parse(role.as_str()).unwrap(), role);
        }
    }

    #[test]
    fn test_role_rejects_unknown() {
        let err = ChatRole::parse("tool").unwrap_err();
        assert!(err.to_string().contains("unknown role"));
    }

    #[test]
    fn test_role_serde_lowercase() {
        let json = serde_json::to_string(&ChatRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let back: ChatRole = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(back, ChatRole::System);
    }

    #[test]
    fn test_turn_constructors() {
        let turn = ChatTurn::user("hello");
        assert_eq!(turn.role, ChatRole::User);
        assert_eq!(turn.content, "hello");

        assert_eq!(ChatTurn::system("s").role, ChatRole::System);
        assert_eq!(ChatTurn::assistant("a").role, ChatRole::Assistant);
    }

    #[test]
    fn test_passage_serde_round_trip() {
        let passage = Passage {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            thread_id: Uuid::new_v4(),
            filename: "manual.pdf".to_string(),
            page: 3,
            content: "Returns are accepted within 30 days.".to_string(),
        };
        let json = serde_json::to_string(&passage).unwrap();
        let back: Passage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, passage.id);
        assert_eq!(back.page, 3);
        assert_eq!(back.content, passage.content);
    }
}
