use serde::{Deserialize, Serialize};

use worklane_core::{EntityMeta, OrganizationId, TenantScopedEntity};

/// A sub-division within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub name: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl Organization {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: EntityMeta::new(),
            name: name.into(),
            currency: None,
            is_default: false,
        }
    }

    pub fn organization_id(&self) -> OrganizationId {
        OrganizationId::from_uuid(*self.meta.id.as_uuid())
    }
}

impl TenantScopedEntity for Organization {
    const COLLECTION: &'static str = "organizations";
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[&["name"]];

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}
