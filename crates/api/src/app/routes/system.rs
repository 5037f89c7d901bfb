use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use worklane_auth::IdentityContext;

use crate::app::errors;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /me - the resolved principal and the request's context values.
pub async fn me(Extension(ctx): Extension<Arc<IdentityContext>>) -> axum::response::Response {
    let principal = match ctx.current_principal(true).await {
        Ok(Some(p)) => p.clone(),
        Ok(None) => return errors::domain_error_to_response(worklane_core::DomainError::Unauthorized),
        Err(e) => return errors::domain_error_to_response(e),
    };
    let permissions = ctx.claims().map(|c| c.permissions.clone()).unwrap_or_default();

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "user_id": principal.id,
            "tenant_id": principal.tenant_id,
            "role_id": principal.role_id,
            "role": principal.role_kind(),
            "employee_id": ctx.current_employee_id().await,
            "organization_id": ctx.current_organization_id().await,
            "language": ctx.language_code(),
            "permissions": permissions,
        })),
    )
        .into_response()
}
