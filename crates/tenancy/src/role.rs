use serde::{Deserialize, Serialize};

use worklane_auth::{PermissionKind, RoleKind};
use worklane_core::{EntityMeta, RelationDef, RoleId, TenantScopedEntity};

/// One of a tenant's built-in roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub name: RoleKind,
    #[serde(default)]
    pub is_system: bool,
}

const ROLE_RELATIONS: &[RelationDef] = &[RelationDef {
    name: "role_permissions",
    collection: "role_permissions",
    local_field: "id",
    foreign_field: "role_id",
    many: true,
}];

impl Role {
    pub fn new(name: RoleKind) -> Self {
        Self {
            meta: EntityMeta::new(),
            name,
            is_system: true,
        }
    }

    pub fn role_id(&self) -> RoleId {
        RoleId::from_uuid(*self.meta.id.as_uuid())
    }
}

impl TenantScopedEntity for Role {
    const COLLECTION: &'static str = "roles";
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[&["name"]];

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn relations() -> &'static [RelationDef] {
        ROLE_RELATIONS
    }
}

/// A `(permission, enabled)` grant attached to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub role_id: RoleId,
    pub permission: PermissionKind,
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
}

const GRANT_RELATIONS: &[RelationDef] = &[RelationDef {
    name: "role",
    collection: "roles",
    local_field: "role_id",
    foreign_field: "id",
    many: false,
}];

impl RolePermission {
    pub fn new(role_id: RoleId, permission: PermissionKind, enabled: bool) -> Self {
        Self {
            meta: EntityMeta::new(),
            role_id,
            permission,
            enabled,
            description: None,
        }
    }
}

impl TenantScopedEntity for RolePermission {
    const COLLECTION: &'static str = "role_permissions";
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[&["role_id", "permission"]];

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn relations() -> &'static [RelationDef] {
        GRANT_RELATIONS
    }
}

use PermissionKind::*;

/// Permissions enabled by default for each built-in role of a new tenant.
///
/// Every other permission kind is still seeded for the role, disabled.
pub const DEFAULT_ROLE_PERMISSIONS: &[(RoleKind, &[PermissionKind])] = &[
    (RoleKind::SuperAdmin, &PermissionKind::ALL),
    (
        RoleKind::Admin,
        &[
            OrgUsersView,
            OrgUsersEdit,
            AllOrgView,
            AllOrgEdit,
            OrgEmployeesView,
            OrgEmployeesEdit,
            ChangeSelectedEmployee,
            ChangeSelectedOrganization,
            ChangeRolesPermissions,
            TenantSetting,
            TimeTracker,
            AccessDeleteAccount,
        ],
    ),
    (
        RoleKind::Manager,
        &[
            OrgUsersView,
            OrgUsersEdit,
            AllOrgView,
            OrgEmployeesView,
            OrgEmployeesEdit,
            ChangeSelectedEmployee,
            TimeTracker,
        ],
    ),
    (RoleKind::DataEntry, &[AllOrgView, OrgEmployeesView, TimeTracker]),
    (RoleKind::Employee, &[TimeTracker, AccessDeleteAccount]),
    (RoleKind::Candidate, &[]),
    (RoleKind::Viewer, &[OrgUsersView, AllOrgView, OrgEmployeesView]),
];

pub fn default_permissions(kind: RoleKind) -> &'static [PermissionKind] {
    DEFAULT_ROLE_PERMISSIONS
        .iter()
        .find(|(role, _)| *role == kind)
        .map(|(_, perms)| *perms)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_has_a_default_entry() {
        for kind in RoleKind::ALL {
            assert!(DEFAULT_ROLE_PERMISSIONS.iter().any(|(r, _)| *r == kind));
        }
        assert_eq!(default_permissions(RoleKind::SuperAdmin).len(), PermissionKind::ALL.len());
        assert!(default_permissions(RoleKind::Candidate).is_empty());
    }

    #[test]
    fn only_grant_managers_may_change_grants_by_default() {
        for (kind, perms) in DEFAULT_ROLE_PERMISSIONS {
            assert_eq!(perms.contains(&ChangeRolesPermissions), kind.manages_grants());
        }
    }

    #[test]
    fn grant_document_shape() {
        let g = RolePermission::new(RoleId::new(), OrgUsersView, true);
        let doc = serde_json::to_value(&g).unwrap();
        assert_eq!(doc["permission"], "ORG_USERS_VIEW");
        assert_eq!(doc["enabled"], true);
        assert!(doc.get("role").is_none());
    }
}
