//! Error types for the chat pipeline.

use dossier_core::error::DossierError;

/// Errors from the chat orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("thread not found: {0}")]
    ThreadNotFound(uuid::Uuid),
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<DossierError> for ChatError {
    fn from(err: DossierError) -> Self {
        match err {
            DossierError::ThreadNotFound(id) => ChatError::ThreadNotFound(id),
            DossierError::Generation(msg) => ChatError::Generation(msg),
            other => ChatError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_display() {
        assert_eq!(ChatError::EmptyMessage.to_string(), "message cannot be empty");
        assert_eq!(
            ChatError::MessageTooLong(2000).to_string(),
            "message exceeds maximum length of 2000 characters"
        );
        let id = Uuid::nil();
        assert_eq!(
            ChatError::ThreadNotFound(id).to_string(),
            format!("thread not found: {}", id)
        );
    }

    #[test]
    fn test_from_dossier_error_preserves_kind() {
        let id = Uuid::new_v4();
        let err: ChatError = DossierError::ThreadNotFound(id).into();
        assert!(matches!(err, ChatError::ThreadNotFound(got) if got == id));

        let err: ChatError = DossierError::Generation("timeout".to_string()).into();
        assert!(matches!(err, ChatError::Generation(_)));

        let err: ChatError = DossierError::Storage("disk full".to_string()).into();
        assert!(matches!(err, ChatError::Storage(_)));
        assert!(err.to_string().contains("disk full"));
    }
}
