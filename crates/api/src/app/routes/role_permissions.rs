use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use worklane_auth::IdentityContext;
use worklane_core::{EntityId, RoleId};
use worklane_infra::handlers::{
    CreateRolePermission, DeleteRolePermission, FindMyPermissions, FindRolePermissions,
    UpdateRolePermission,
};

use crate::app::{errors, services::AppServices};
use crate::authz;

#[derive(Debug, Deserialize)]
pub struct UpdateRolePermissionRequest {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListRolePermissionsParams {
    #[serde(default)]
    pub role_id: Option<String>,
}

/// GET /role-permissions - grants visible to the caller's role.
pub async fn list_role_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<Arc<IdentityContext>>,
    Query(params): Query<ListRolePermissionsParams>,
) -> axum::response::Response {
    let role_id = match params.role_id.as_deref().map(str::parse::<RoleId>).transpose() {
        Ok(role_id) => role_id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.dispatcher.dispatch(&ctx, FindRolePermissions { role_id }).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// GET /role-permissions/me - the caller's enabled grants.
pub async fn my_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<Arc<IdentityContext>>,
) -> axum::response::Response {
    match services.dispatcher.dispatch(&ctx, FindMyPermissions).await {
        Ok(grants) => (StatusCode::OK, Json(grants)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn create_role_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<Arc<IdentityContext>>,
    Json(body): Json<CreateRolePermission>,
) -> axum::response::Response {
    if let Err(resp) = authz::authorize(&services, &ctx, &body).await {
        return resp;
    }

    match services.dispatcher.dispatch(&ctx, body).await {
        Ok(grant) => (StatusCode::CREATED, Json(grant)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn update_role_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<Arc<IdentityContext>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateRolePermissionRequest>,
) -> axum::response::Response {
    let id = match id.parse::<EntityId>() {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let mutation = UpdateRolePermission {
        id,
        enabled: body.enabled,
        description: body.description,
    };
    if let Err(resp) = authz::authorize(&services, &ctx, &mutation).await {
        return resp;
    }

    match services.dispatcher.dispatch(&ctx, mutation).await {
        Ok(grant) => (StatusCode::OK, Json(grant)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn delete_role_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<Arc<IdentityContext>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match id.parse::<EntityId>() {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let mutation = DeleteRolePermission { id };
    if let Err(resp) = authz::authorize(&services, &ctx, &mutation).await {
        return resp;
    }

    match services.dispatcher.dispatch(&ctx, mutation).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
