//! Daemon configuration loaded from the environment.

use std::path::PathBuf;

use consilium_core::{Error, Result};

/// Top-level configuration for `consiliumd`.
///
/// Environment variables:
///
/// | Variable             | Default                      | Meaning                                  |
/// |----------------------|------------------------------|------------------------------------------|
/// | `DATABASE_URL`       | (required)                   | Postgres connection string               |
/// | `CONTENT_DIR`        | `./data/content`             | Root directory of the local content store|
/// | `INTEGRITY_LOG_PATH` | `./data/integrity.jsonl`     | Append-only integrity audit log          |
///
/// Dispatcher, verifier, extraction, and pool settings have their own
/// `from_env` loaders in their crates; this struct only carries what the
/// daemon wires directly. Embedders constructing a [`DocumentRegistry`]
/// or [`LogNotifier`] pass the permalink base and event-log path in.
///
/// [`DocumentRegistry`]: crate::DocumentRegistry
/// [`LogNotifier`]: crate::LogNotifier
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub content_dir: PathBuf,
    pub integrity_log_path: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| Error::Config("DATABASE_URL is not set".to_string()))?;

        Ok(Self {
            database_url,
            content_dir: std::env::var("CONTENT_DIR")
                .unwrap_or_else(|_| "./data/content".to_string())
                .into(),
            integrity_log_path: std::env::var("INTEGRITY_LOG_PATH")
                .unwrap_or_else(|_| "./data/integrity.jsonl".to_string())
                .into(),
        })
    }
}
