use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use worklane_auth::IdentityContext;
use worklane_core::{EntityId, FindOptions, OrderBy, QueryDescriptor, SortDirection};

use crate::app::{errors, services::AppServices};
use crate::authz::{self, EDIT_ORGANIZATIONS, VIEW_ORGANIZATIONS};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub skip: Option<i64>,
    pub take: Option<i64>,
    pub order: Option<String>,
    pub direction: Option<SortDirection>,
    #[serde(default)]
    pub with_deleted: bool,
}

impl ListParams {
    fn descriptor(&self) -> QueryDescriptor {
        let mut descriptor = QueryDescriptor::new();
        if let Some(field) = &self.order {
            descriptor = descriptor.order_by(OrderBy {
                field: field.clone(),
                direction: self.direction.unwrap_or_default(),
            });
        }
        descriptor.skip = self.skip;
        descriptor.take = self.take;
        descriptor.with_deleted = self.with_deleted;
        descriptor
    }
}

fn parse_id(raw: &str) -> Result<EntityId, axum::response::Response> {
    raw.parse::<EntityId>()
        .map_err(errors::domain_error_to_response)
}

/// GET /organizations - one page of the caller's organizations.
pub async fn list_organizations(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<Arc<IdentityContext>>,
    Query(params): Query<ListParams>,
) -> axum::response::Response {
    if let Err(resp) = authz::authorize(&services, &ctx, &VIEW_ORGANIZATIONS).await {
        return resp;
    }

    match services.organizations.paginate(&ctx, &params.descriptor()).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// POST /organizations - `tenant_id` in the body is ignored.
pub async fn create_organization(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<Arc<IdentityContext>>,
    Json(body): Json<JsonValue>,
) -> axum::response::Response {
    if let Err(resp) = authz::authorize(&services, &ctx, &EDIT_ORGANIZATIONS).await {
        return resp;
    }

    match services.organizations.create_partial(&ctx, body).await {
        Ok(org) => (StatusCode::CREATED, Json(org)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn get_organization(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<Arc<IdentityContext>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::authorize(&services, &ctx, &VIEW_ORGANIZATIONS).await {
        return resp;
    }
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .organizations
        .find_one_by_id(&ctx, id, &FindOptions::new())
        .await
    {
        Ok(org) => (StatusCode::OK, Json(org)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// PUT /organizations/:id - JSON merge patch; protected fields are dropped.
pub async fn update_organization(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<Arc<IdentityContext>>,
    Path(id): Path<String>,
    Json(patch): Json<JsonValue>,
) -> axum::response::Response {
    if let Err(resp) = authz::authorize(&services, &ctx, &EDIT_ORGANIZATIONS).await {
        return resp;
    }
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.organizations.update(&ctx, id, patch).await {
        Ok(org) => (StatusCode::OK, Json(org)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// DELETE /organizations/:id - soft remove.
pub async fn remove_organization(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<Arc<IdentityContext>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::authorize(&services, &ctx, &EDIT_ORGANIZATIONS).await {
        return resp;
    }
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.organizations.soft_remove(&ctx, id).await {
        Ok(org) => (StatusCode::OK, Json(org)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn recover_organization(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<Arc<IdentityContext>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::authorize(&services, &ctx, &EDIT_ORGANIZATIONS).await {
        return resp;
    }
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.organizations.soft_recover(&ctx, id).await {
        Ok(org) => (StatusCode::OK, Json(org)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
