use serde::{Deserialize, Serialize};

use worklane_auth::PermissionKind;
use worklane_core::{RoleId, TenantId};

/// Notifications published by tenancy mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TenancyNotification {
    TenantCreated {
        tenant_id: TenantId,
        name: String,
    },
    RolePermissionChanged {
        role_id: RoleId,
        permission: PermissionKind,
        enabled: Option<bool>,
    },
}

impl TenancyNotification {
    pub fn kind(&self) -> &'static str {
        match self {
            TenancyNotification::TenantCreated { .. } => "tenant_created",
            TenancyNotification::RolePermissionChanged { .. } => "role_permission_changed",
        }
    }
}
