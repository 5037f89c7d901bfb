use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};

use worklane_auth::{IdentityContext, RequestMetadata, request_scope};

use crate::app::services::AppServices;

pub const ORGANIZATION_HEADER: &str = "organization-id";
pub const LANGUAGE_HEADER: &str = "language";

/// Creates the request's [`IdentityContext`] and runs the rest of the stack
/// inside its scope. The context is torn down when the response is ready.
///
/// No credential check happens here; routes decide what they require.
pub async fn context_middleware(
    State(services): State<Arc<AppServices>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let meta = request_metadata(req.headers());
    let handle = IdentityContext::create(meta, Some(Arc::clone(&services.resolver)));
    let ctx = Arc::clone(handle.context());

    tracing::debug!(
        context_id = %ctx.id(),
        method = %req.method(),
        path = %req.uri().path(),
        "request context created"
    );
    req.extensions_mut().insert(ctx);

    request_scope(handle, next.run(req)).await
}

pub fn request_metadata(headers: &HeaderMap) -> RequestMetadata {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    RequestMetadata {
        authorization: text(header::AUTHORIZATION.as_str()),
        organization_id: text(ORGANIZATION_HEADER),
        language: text(LANGUAGE_HEADER),
    }
}
