//! Storage configuration read from the environment.

use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::storage::{InMemoryStore, SqliteStore, StoragePort, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "in_memory" => Ok(StorageBackend::Memory),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown storage backend `{0}` (expected `memory` or `sqlite`)")]
    UnknownBackend(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Which storage adapter to build, and where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite URL. `None` with the SQLite backend opens a private in-memory database.
    pub database_url: Option<String>,
}

impl StorageConfig {
    /// Reads `STORAGE_BACKEND` (default `memory`) and `DATABASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match std::env::var("STORAGE_BACKEND") {
            Ok(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => StorageBackend::Memory,
        };
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        Ok(Self {
            backend,
            database_url,
        })
    }

    pub async fn connect(&self) -> Result<Arc<dyn StoragePort>, ConfigError> {
        let storage: Arc<dyn StoragePort> = match (self.backend, &self.database_url) {
            (StorageBackend::Memory, _) => Arc::new(InMemoryStore::new()),
            (StorageBackend::Sqlite, Some(url)) => Arc::new(SqliteStore::connect(url).await?),
            (StorageBackend::Sqlite, None) => {
                tracing::warn!("DATABASE_URL not set; using a transient in-memory SQLite database");
                Arc::new(SqliteStore::in_memory().await?)
            }
        };
        tracing::info!(backend = storage.backend(), "storage ready");
        Ok(storage)
    }
}
