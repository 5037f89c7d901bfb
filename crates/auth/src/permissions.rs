use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of permission kinds a role may be granted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionKind {
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
    AccessDeleteAllData,
}

impl PermissionKind {
    pub const ALL: [PermissionKind; 13] = [
        PermissionKind::OrgUsersView,
        PermissionKind::OrgUsersEdit,
        PermissionKind::AllOrgView,
        PermissionKind::AllOrgEdit,
        PermissionKind::OrgEmployeesView,
        PermissionKind::OrgEmployeesEdit,
        PermissionKind::ChangeSelectedEmployee,
        PermissionKind::ChangeSelectedOrganization,
        PermissionKind::ChangeRolesPermissions,
        PermissionKind::TenantSetting,
        PermissionKind::TimeTracker,
        PermissionKind::AccessDeleteAccount,
        PermissionKind::AccessDeleteAllData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionKind::OrgUsersView => "ORG_USERS_VIEW",
            PermissionKind::OrgUsersEdit => "ORG_USERS_EDIT",
            PermissionKind::AllOrgView => "ALL_ORG_VIEW",
            PermissionKind::AllOrgEdit => "ALL_ORG_EDIT",
            PermissionKind::OrgEmployeesView => "ORG_EMPLOYEES_VIEW",
            PermissionKind::OrgEmployeesEdit => "ORG_EMPLOYEES_EDIT",
            PermissionKind::ChangeSelectedEmployee => "CHANGE_SELECTED_EMPLOYEE",
            PermissionKind::ChangeSelectedOrganization => "CHANGE_SELECTED_ORGANIZATION",
            PermissionKind::ChangeRolesPermissions => "CHANGE_ROLES_PERMISSIONS",
            PermissionKind::TenantSetting => "TENANT_SETTING",
            PermissionKind::TimeTracker => "TIME_TRACKER",
            PermissionKind::AccessDeleteAccount => "ACCESS_DELETE_ACCOUNT",
            PermissionKind::AccessDeleteAllData => "ACCESS_DELETE_ALL_DATA",
        }
    }
}

impl core::fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission '{0}'")]
pub struct UnknownPermission(pub String);

impl FromStr for PermissionKind {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionKind::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPermission(s.to_string()))
    }
}

/// A `(permission, enabled)` pair attached to a role.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub permission: PermissionKind,
    pub enabled: bool,
}

impl PermissionGrant {
    pub fn enabled(permission: PermissionKind) -> Self {
        Self {
            permission,
            enabled: true,
        }
    }

    pub fn disabled(permission: PermissionKind) -> Self {
        Self {
            permission,
            enabled: false,
        }
    }
}

/// How a requested permission set is matched against granted permissions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Every requested permission must be granted (vacuously true when empty).
    All,
    /// At least one requested permission must be granted (false when empty).
    Any,
}

/// Match `requested` against `granted` under `policy`.
pub fn grants_satisfy(
    granted: &[PermissionKind],
    requested: &[PermissionKind],
    policy: MatchPolicy,
) -> bool {
    match policy {
        MatchPolicy::All => requested.iter().all(|p| granted.contains(p)),
        MatchPolicy::Any => requested.iter().any(|p| granted.contains(p)),
    }
}

/// Enabled permissions out of a grant list.
pub fn enabled_permissions(grants: &[PermissionGrant]) -> Vec<PermissionKind> {
    grants
        .iter()
        .filter(|g| g.enabled)
        .map(|g| g.permission)
        .collect()
}
