use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use worklane_auth::{PermissionGrant, Principal, RoleGrants, RoleStore};
use worklane_core::entity::{self, fields};
use worklane_core::{
    DomainError, DomainResult, EntityId, OrganizationId, Predicate, RoleId, StorageQuery,
    TenantId, TenantScopedEntity, UserId,
};
use worklane_tenancy::{Organization, Role, RolePermission, UserRecord};

use crate::storage::StoragePort;

/// [`RoleStore`] over the `users`, `roles` and `role_permissions` collections.
///
/// Principal lookup is by user id across tenants: a principal that has not
/// bootstrapped a tenant yet has a user row with `tenant_id = null`. Role and
/// grant lookups are confined to the user's tenant.
#[derive(Clone)]
pub struct StoreRoleStore {
    storage: Arc<dyn StoragePort>,
}

impl StoreRoleStore {
    pub fn new(storage: Arc<dyn StoragePort>) -> Self {
        Self { storage }
    }

    /// Insert a user row as-is (registration, seeding).
    pub async fn register_user(&self, user: UserRecord) -> DomainResult<UserRecord> {
        let doc = serde_json::to_value(&user)
            .map_err(|e| DomainError::infrastructure(format!("failed to encode user: {e}")))?;
        self.storage.insert(UserRecord::COLLECTION, doc).await?;
        tracing::info!(user_id = %user.user_id(), tenant_id = ?user.meta.tenant_id, "user registered");
        Ok(user)
    }

    /// Move a user into `tenant` with `role`.
    pub async fn assign_tenant_role(
        &self,
        user_id: UserId,
        tenant: TenantId,
        role: RoleId,
    ) -> DomainResult<()> {
        self.rewrite_user(user_id, |user| {
            user.meta.tenant_id = Some(tenant);
            user.role_id = Some(role);
        })
        .await
    }

    /// Move a tenantless user into `tenant` with `role`.
    ///
    /// The tenantless check and the write are one atomic step, so of several
    /// concurrent claims by the same user exactly one succeeds; the rest get
    /// `Conflict`.
    pub async fn claim_first_tenant(
        &self,
        user_id: UserId,
        tenant: TenantId,
        role: RoleId,
    ) -> DomainResult<()> {
        let mut user = self.load_user(user_id).await?.ok_or(DomainError::NotFound)?;
        if user.meta.tenant_id.is_some() {
            return Err(Self::already_bootstrapped());
        }
        user.meta.tenant_id = Some(tenant);
        user.role_id = Some(role);
        user.meta.updated_at = entity::now();
        let doc = serde_json::to_value(&user)
            .map_err(|e| DomainError::infrastructure(format!("failed to encode user: {e}")))?;

        let tenantless = Predicate::is_null(fields::TENANT_ID).and(Predicate::eq(fields::IS_ARCHIVED, false));
        let claimed = self
            .storage
            .replace_if(UserRecord::COLLECTION, doc, &tenantless, &Predicate::any(Vec::new()))
            .await?;
        if !claimed {
            return Err(Self::already_bootstrapped());
        }
        Ok(())
    }

    fn already_bootstrapped() -> DomainError {
        DomainError::conflict("principal already belongs to a tenant")
    }

    /// Reverse [`Self::assign_tenant_role`] and [`Self::claim_first_tenant`].
    pub async fn clear_tenant_role(&self, user_id: UserId) -> DomainResult<()> {
        self.rewrite_user(user_id, |user| {
            user.meta.tenant_id = None;
            user.role_id = None;
        })
        .await
    }

    async fn rewrite_user(
        &self,
        user_id: UserId,
        change: impl FnOnce(&mut UserRecord),
    ) -> DomainResult<()> {
        let mut user = self.load_user(user_id).await?.ok_or(DomainError::NotFound)?;
        change(&mut user);
        user.meta.updated_at = entity::now();
        let doc = serde_json::to_value(&user)
            .map_err(|e| DomainError::infrastructure(format!("failed to encode user: {e}")))?;
        if !self.storage.replace(UserRecord::COLLECTION, doc).await? {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }

    async fn load_user(&self, user_id: UserId) -> DomainResult<Option<UserRecord>> {
        let filter = Predicate::eq(fields::ID, EntityId::from(user_id).to_string())
            .and(Predicate::eq(fields::IS_ARCHIVED, false));
        self.storage
            .find_one(UserRecord::COLLECTION, &filter)
            .await?
            .map(decode::<UserRecord>)
            .transpose()
    }

    async fn load_role(&self, tenant: TenantId, role_id: RoleId) -> DomainResult<Option<RoleGrants>> {
        let scope = Predicate::eq(fields::TENANT_ID, tenant.to_string())
            .and(Predicate::eq(fields::IS_ARCHIVED, false));

        let role_filter = scope
            .clone()
            .and(Predicate::eq(fields::ID, EntityId::from(role_id).to_string()));
        let Some(role) = self.storage.find_one(Role::COLLECTION, &role_filter).await? else {
            return Ok(None);
        };
        let role: Role = decode(role)?;

        let grant_filter = scope.and(Predicate::eq("role_id", role_id.to_string()));
        let grants = self
            .storage
            .find(RolePermission::COLLECTION, &StorageQuery::matching(grant_filter))
            .await?
            .into_iter()
            .map(decode::<RolePermission>)
            .map(|g| {
                g.map(|g| PermissionGrant {
                    permission: g.permission,
                    enabled: g.enabled,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;

        Ok(Some(RoleGrants {
            role_id,
            kind: role.name,
            grants,
        }))
    }
}

#[async_trait]
impl RoleStore for StoreRoleStore {
    async fn find_principal_by_id(&self, id: UserId) -> DomainResult<Option<Principal>> {
        let Some(user) = self.load_user(id).await? else {
            return Ok(None);
        };

        let role = match (user.meta.tenant_id, user.role_id) {
            (Some(tenant), Some(role_id)) => self.load_role(tenant, role_id).await?,
            _ => None,
        };

        Ok(Some(Principal {
            id,
            tenant_id: user.meta.tenant_id,
            role_id: user.role_id,
            role,
            employee_id: user.employee_id,
        }))
    }

    async fn organization_tenant(&self, id: OrganizationId) -> DomainResult<Option<TenantId>> {
        let filter = Predicate::eq(fields::ID, EntityId::from(id).to_string())
            .and(Predicate::eq(fields::IS_ARCHIVED, false));
        Ok(self
            .storage
            .find_one(Organization::COLLECTION, &filter)
            .await?
            .map(decode::<Organization>)
            .transpose()?
            .and_then(|org| org.meta.tenant_id))
    }
}

fn decode<T: DeserializeOwned>(doc: JsonValue) -> DomainResult<T> {
    serde_json::from_value(doc)
        .map_err(|e| DomainError::infrastructure(format!("malformed stored row: {e}")))
}
