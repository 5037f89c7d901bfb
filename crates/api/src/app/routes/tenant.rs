use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use worklane_infra::handlers::CreateTenant;

use crate::app::{errors, services::AppServices};

/// POST /tenant - bootstrap a tenant for a principal that has none.
///
/// Dispatched through the ambient request scope rather than an explicit context.
pub async fn create_tenant(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<CreateTenant>,
) -> axum::response::Response {
    match services.dispatcher.dispatch_current(body).await {
        Ok(tenant) => (StatusCode::CREATED, Json(tenant)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
