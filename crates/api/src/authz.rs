//! Route-level permission guards.
//!
//! Each route names the permissions it requires; the guard asks the
//! [`PermissionEvaluator`](worklane_auth::PermissionEvaluator) (ANY match,
//! empty list allowed) before the handler touches storage.

use worklane_auth::{IdentityContext, PermissionKind, RequiresPermissions};

use crate::app::errors;
use crate::app::services::AppServices;

/// Permissions a route requires.
#[derive(Debug, Clone, Copy)]
pub struct RouteGuard(pub &'static [PermissionKind]);

impl RequiresPermissions for RouteGuard {
    fn required_permissions(&self) -> &[PermissionKind] {
        self.0
    }
}

pub const OPEN: RouteGuard = RouteGuard(&[]);
pub const VIEW_ORGANIZATIONS: RouteGuard =
    RouteGuard(&[PermissionKind::AllOrgView, PermissionKind::AllOrgEdit]);
pub const EDIT_ORGANIZATIONS: RouteGuard = RouteGuard(&[PermissionKind::AllOrgEdit]);

/// Check `op` for the current request. The error is ready to return.
pub async fn authorize<O>(
    services: &AppServices,
    ctx: &IdentityContext,
    op: &O,
) -> Result<(), axum::response::Response>
where
    O: RequiresPermissions + ?Sized,
{
    services
        .evaluator
        .authorize_operation(ctx, op)
        .await
        .map_err(errors::domain_error_to_response)
}
