use thiserror::Error;

/// Top-level error type for the Dossier system.
///
/// Each variant wraps a subsystem-specific failure. Subsystem crates define
/// their own error types and implement `From<DossierError>` so that the `?`
/// operator works seamlessly across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DossierError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Extraction or chunking produced no text; the upload is rejected and
    /// nothing is indexed or persisted.
    #[error("Document contains no extractable text: {0}")]
    EmptyDocument(String),

    /// Vector search failed. Callers in the chat path degrade this to
    /// "no context found" instead of failing the request.
    #[error("Document index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(uuid::Uuid),

    #[error("Thread not found: {0}")]
    ThreadNotFound(uuid::Uuid),

    /// The generation capability failed. The user message stays persisted
    /// so the turn is not lost.
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for DossierError {
    fn from(err: toml::de::Error) -> Self {
        DossierError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DossierError {
    fn from(err: toml::ser::Error) -> Self {
        DossierError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for DossierError {
    fn from(err: serde_json::Error) -> Self {
        DossierError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Dossier operations.
pub type Result<T> = std::result::Result<T, DossierError>;
