//! Process configuration read once at startup.

use std::net::SocketAddr;

use thiserror::Error;

use worklane_events::DispatchError;
use worklane_infra::{ConfigError, StorageConfig};

const DEV_JWT_SECRET: &str = "dev-secret";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid BIND_ADDR `{0}`")]
    BindAddr(String),

    #[error(transparent)]
    Storage(#[from] ConfigError),

    #[error("failed to wire mutation handlers: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("failed to start background worker: {0}")]
    Worker(#[from] std::io::Error),

    #[error("failed to seed defaults: {0}")]
    Seed(#[from] worklane_core::DomainError),
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub storage: StorageConfig,
}

impl ApiConfig {
    /// Reads `BIND_ADDR`, `JWT_SECRET`, `STORAGE_BACKEND` and `DATABASE_URL`.
    pub fn from_env() -> Result<Self, StartupError> {
        let raw_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse()
            .map_err(|_| StartupError::BindAddr(raw_addr.clone()))?;

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        Ok(Self {
            bind_addr,
            jwt_secret,
            storage: StorageConfig::from_env()?,
        })
    }

    /// In-memory storage on an ephemeral local port.
    pub fn for_tests(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: jwt_secret.into(),
            storage: StorageConfig::default(),
        }
    }
}
