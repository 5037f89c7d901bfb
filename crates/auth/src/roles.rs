use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Built-in role kinds. Every tenant owns one role record per kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleKind {
    SuperAdmin,
    Admin,
    DataEntry,
    Employee,
    Candidate,
    Manager,
    Viewer,
}

impl RoleKind {
    pub const ALL: [RoleKind; 7] = [
        RoleKind::SuperAdmin,
        RoleKind::Admin,
        RoleKind::DataEntry,
        RoleKind::Employee,
        RoleKind::Candidate,
        RoleKind::Manager,
        RoleKind::Viewer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::SuperAdmin => "SUPER_ADMIN",
            RoleKind::Admin => "ADMIN",
            RoleKind::DataEntry => "DATA_ENTRY",
            RoleKind::Employee => "EMPLOYEE",
            RoleKind::Candidate => "CANDIDATE",
            RoleKind::Manager => "MANAGER",
            RoleKind::Viewer => "VIEWER",
        }
    }

    /// Roles allowed to edit other roles' permission grants.
    pub fn manages_grants(&self) -> bool {
        matches!(self, RoleKind::SuperAdmin | RoleKind::Admin)
    }
}

impl core::fmt::Display for RoleKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for RoleKind {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoleKind::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}
