//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: storage, identity resolution, dispatcher and workers
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::config::{ApiConfig, StartupError};
use crate::middleware;

pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &ApiConfig) -> Result<Router, StartupError> {
    let services = Arc::new(services::build_services(config).await?);
    Ok(router(services))
}

/// Router over already-built services (tests seed users through `services`).
pub fn router(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(
            ServiceBuilder::new()
                .layer(Extension(Arc::clone(&services)))
                .layer(axum::middleware::from_fn_with_state(
                    services,
                    middleware::context_middleware,
                )),
        )
}
