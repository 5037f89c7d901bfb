use serde::{Deserialize, Serialize};

use worklane_core::{EmployeeId, EntityMeta, RelationDef, RoleId, TenantScopedEntity, UserId};

/// A user account. `tenant_id` is `None` until the user bootstraps a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role_id: Option<RoleId>,
    #[serde(default)]
    pub employee_id: Option<EmployeeId>,
}

const RELATIONS: &[RelationDef] = &[RelationDef {
    name: "role",
    collection: "roles",
    local_field: "role_id",
    foreign_field: "id",
    many: false,
}];

impl UserRecord {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            meta: EntityMeta::new(),
            email: email.into(),
            first_name: None,
            last_name: None,
            role_id: None,
            employee_id: None,
        }
    }

    pub fn user_id(&self) -> UserId {
        UserId::from_uuid(*self.meta.id.as_uuid())
    }
}

impl TenantScopedEntity for UserRecord {
    const COLLECTION: &'static str = "users";

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn relations() -> &'static [RelationDef] {
        RELATIONS
    }
}
