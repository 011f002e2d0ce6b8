//! Dossier application binary - composition root.
//!
//! Ties together all Dossier crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Open the SQLite conversation store
//! 3. Rebuild the vector index from persisted passages
//! 4. Wire the embedding and generation providers
//! 5. Start the axum REST API server

use std::path::PathBuf;
use std::sync::Arc;

use dossier_api::routes;
use dossier_api::state::AppState;
use dossier_chat::generation::{GenerationService, HttpGenerationService};
use dossier_core::config::DossierConfig;
use dossier_index::embedding::{DynEmbeddingService, HttpEmbeddingService, MockEmbedding};
use dossier_index::VectorIndex;
use dossier_store::Database;

/// Expand ~ to home directory in a path string.
fn resolve_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// Resolve the config file path (DOSSIER_CONFIG env, or ~/.dossier/config.toml).
fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("DOSSIER_CONFIG") {
        return PathBuf::from(p);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".dossier").join("config.toml");
    }
    PathBuf::from("config.toml")
}

/// Read an API key from the environment variable named in config.
fn api_key_from_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(key) if !key.is_empty() => Some(key),
        _ => {
            tracing::warn!(var = %var_name, "API key env var not set");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Dossier v{}", env!("CARGO_PKG_VERSION"));

    // Config.
    let config_file = config_path();
    let config = DossierConfig::load_or_default(&config_file);
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Storage.
    let data_dir = resolve_path(&config.general.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let db_path = data_dir.join("dossier.db");
    let database = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite conversation store opened");

    // Vector index.
    let index = Arc::new(VectorIndex::new());

    // Embedding provider.
    let embedder: Arc<dyn DynEmbeddingService> = match config.embedding.provider.as_str() {
        "http" => {
            tracing::info!(
                base_url = %config.embedding.base_url,
                model = %config.embedding.model,
                "Using HTTP embedding provider"
            );
            Arc::new(HttpEmbeddingService::new(
                config.embedding.base_url.clone(),
                config.embedding.model.clone(),
                api_key_from_env(&config.embedding.api_key_env),
                config.embedding.dimensions,
            ))
        }
        other => {
            if other != "mock" {
                tracing::warn!(provider = %other, "Unknown embedding provider; using mock");
            } else {
                tracing::warn!("Using mock embeddings; retrieval quality will be poor");
            }
            Arc::new(MockEmbedding::new())
        }
    };

    // Generation provider.
    let generator: Arc<dyn GenerationService> = Arc::new(HttpGenerationService::new(
        config.generation.base_url.clone(),
        config.generation.model.clone(),
        api_key_from_env(&config.generation.api_key_env),
        config.generation.temperature,
    ));

    // Upload directory.
    let upload_dir = {
        let configured = resolve_path(&config.upload.upload_dir);
        if configured.is_absolute() {
            configured
        } else {
            data_dir.join(configured)
        }
    };
    std::fs::create_dir_all(&upload_dir)?;

    // Application state; rebuild the index from persisted passages.
    let state = AppState::new(config, database, index, embedder, generator, upload_dir);
    let restored = state.pipeline.rebuild()?;
    tracing::info!(passages = restored, "Vector index ready");

    // API server.
    routes::start_server(state).await?;

    Ok(())
}
