use serde::{Deserialize, Serialize};

use worklane_core::{EmployeeId, RoleId, TenantId, UserId};

use crate::{PermissionGrant, PermissionKind, RoleKind, permissions::enabled_permissions};

/// A role together with its permission grants, as resolved from the role store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrants {
    pub role_id: RoleId,
    pub kind: RoleKind,
    pub grants: Vec<PermissionGrant>,
}

impl RoleGrants {
    pub fn enabled(&self) -> Vec<PermissionKind> {
        enabled_permissions(&self.grants)
    }

    /// `true` if `permission` is present and enabled.
    pub fn allows(&self, permission: PermissionKind) -> bool {
        self.grants
            .iter()
            .any(|g| g.enabled && g.permission == permission)
    }
}

/// The authenticated identity making a request.
///
/// Loaded once per request from the role store and cached on the context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    /// `None` until the principal bootstraps its first tenant.
    pub tenant_id: Option<TenantId>,
    pub role_id: Option<RoleId>,
    pub role: Option<RoleGrants>,
    pub employee_id: Option<EmployeeId>,
}

impl Principal {
    pub fn role_kind(&self) -> Option<RoleKind> {
        self.role.as_ref().map(|r| r.kind)
    }

    pub fn has_role(&self, kind: RoleKind) -> bool {
        self.role_kind() == Some(kind)
    }
}
