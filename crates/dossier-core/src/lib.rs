//! Shared types, errors, and configuration for the Dossier workspace.

pub mod config;
pub mod error;
pub mod types;

pub use error::{DossierError, Result};
