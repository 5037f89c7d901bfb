use worklane_core::TenantId;

use crate::NotificationEnvelope;

/// Messages bound to one tenant.
///
/// Workers pinned to a tenant use this to drop messages from other tenants.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl<E> TenantScoped for NotificationEnvelope<E> {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id()
    }
}
