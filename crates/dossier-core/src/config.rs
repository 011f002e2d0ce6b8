use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DossierError, Result};

/// Top-level configuration for the Dossier service.
///
/// Loaded from `~/.dossier/config.toml` by default. Each section corresponds
/// to one subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DossierConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

impl DossierConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DossierConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file does not
    /// exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Reject configurations that cannot produce a working pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.window_chars == 0 {
            return Err(DossierError::Config(
                "chunking.window_chars must be positive".to_string(),
            ));
        }
        if self.chunking.overlap_chars >= self.chunking.window_chars {
            return Err(DossierError::Config(format!(
                "chunking.overlap_chars ({}) must be smaller than window_chars ({})",
                self.chunking.overlap_chars, self.chunking.window_chars
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(DossierError::Config(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.retrieval.max_distance) {
            return Err(DossierError::Config(format!(
                "retrieval.max_distance ({}) must be within [0, 2] for cosine distance",
                self.retrieval.max_distance
            )));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for SQLite and uploaded files.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP port to bind on 127.0.0.1.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.dossier/data".to_string(),
            log_level: "info".to_string(),
            port: 3040,
        }
    }
}

/// Retrieval policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of nearest passages fetched per query.
    pub top_k: usize,
    /// Cosine-distance relevance threshold (lower = more similar). Depends
    /// on the embedding model; retune when switching providers.
    pub max_distance: f64,
    /// When every candidate exceeds the threshold, return the unfiltered
    /// top-k instead of refusing.
    pub fallback_to_top_k: bool,
    /// Number of recent user/assistant messages included in the prompt.
    pub history_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 6,
            max_distance: 0.5,
            fallback_to_top_k: true,
            history_limit: 20,
        }
    }
}

/// Document chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in characters.
    pub window_chars: usize,
    /// Overlap between consecutive windows, in characters.
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_chars: 500,
            overlap_chars: 50,
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "mock" for the deterministic test embedder, "http" for an
    /// OpenAI-compatible embeddings endpoint.
    pub provider: String,
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            base_url: "http://localhost:11434/v1".to_string(),
            model: "all-minilm".to_string(),
            api_key_env: "DOSSIER_EMBED_API_KEY".to_string(),
            dimensions: 384,
        }
    }
}

/// Generation capability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// OpenAI-compatible chat completions base URL.
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Sampling temperature; kept at minimum for context-bound answering.
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            temperature: 0.0,
        }
    }
}

/// Upload boundary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum accepted upload size in megabytes.
    pub max_size_mb: u64,
    /// Directory for original upload bytes, relative to data_dir unless
    /// absolute.
    pub upload_dir: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 20,
            upload_dir: "uploads".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DossierConfig::default();
        assert_eq!(config.retrieval.top_k, 6);
        assert!((config.retrieval.max_distance - 0.5).abs() < f64::EPSILON);
        assert!(config.retrieval.fallback_to_top_k);
        assert_eq!(config.chunking.window_chars, 500);
        assert_eq!(config.chunking.overlap_chars, 50);
        assert_eq!(config.upload.max_size_mb, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[general]
port = 8088

[retrieval]
top_k = 4
max_distance = 0.35
fallback_to_top_k = false
"#,
        )
        .unwrap();

        let config = DossierConfig::load(&path).unwrap();
        assert_eq!(config.general.port, 8088);
        assert_eq!(config.retrieval.top_k, 4);
        assert!(!config.retrieval.fallback_to_top_k);
        // Unspecified sections keep defaults.
        assert_eq!(config.chunking.window_chars, 500);
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = DossierConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.retrieval.top_k, 6);
    }

    #[test]
    fn test_validate_rejects_overlap_ge_window() {
        let mut config = DossierConfig::default();
        config.chunking.overlap_chars = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let mut config = DossierConfig::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_distance() {
        let mut config = DossierConfig::default();
        config.retrieval.max_distance = 3.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not valid toml [[[").unwrap();
        let config = DossierConfig::load_or_default(&path);
        assert_eq!(config.retrieval.top_k, 6);
    }
}
