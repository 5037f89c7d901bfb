use serde::{Deserialize, Serialize};

use worklane_core::{EntityMeta, TenantId, TenantScopedEntity};

/// The top-level isolation boundary. A tenant row is scoped to itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub name: String,
}

impl Tenant {
    pub fn new(name: impl Into<String>) -> Self {
        let mut meta = EntityMeta::new();
        meta.tenant_id = Some(TenantId::from_uuid(*meta.id.as_uuid()));
        Self {
            meta,
            name: name.into(),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        TenantId::from_uuid(*self.meta.id.as_uuid())
    }
}

impl TenantScopedEntity for Tenant {
    const COLLECTION: &'static str = "tenants";

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_rows_scope_to_themselves() {
        let t = Tenant::new("Acme");
        assert_eq!(t.meta.tenant_id, Some(t.tenant_id()));
    }
}
