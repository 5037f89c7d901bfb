use std::sync::Arc;

use async_trait::async_trait;

use worklane_core::{DomainError, DomainResult, OrganizationId, TenantId, UserId};

use crate::{IdentityContext, PermissionKind, Principal};

/// Resolves a principal (with its role and permission grants) by id.
///
/// Implementations are shared, read-mostly collaborators. Lookup failures
/// must surface as `DomainError::Infrastructure`, never as "not found".
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_principal_by_id(&self, id: UserId) -> DomainResult<Option<Principal>>;

    /// Tenant owning a live organization. `None` when unknown or archived.
    async fn organization_tenant(&self, id: OrganizationId) -> DomainResult<Option<TenantId>>;
}

#[async_trait]
impl<S> RoleStore for Arc<S>
where
    S: RoleStore + ?Sized,
{
    async fn find_principal_by_id(&self, id: UserId) -> DomainResult<Option<Principal>> {
        (**self).find_principal_by_id(id).await
    }

    async fn organization_tenant(&self, id: OrganizationId) -> DomainResult<Option<TenantId>> {
        (**self).organization_tenant(id).await
    }
}

/// Operation-side authorization contract.
///
/// Implement this on operations that require permissions. An empty slice
/// means the operation is open to any caller.
pub trait RequiresPermissions {
    fn required_permissions(&self) -> &[PermissionKind];
}

/// Gates operations on role-granted permissions.
///
/// Matching is ANY: one enabled grant out of the required set is enough.
#[derive(Clone)]
pub struct PermissionEvaluator {
    store: Arc<dyn RoleStore>,
}

impl PermissionEvaluator {
    pub fn new(store: Arc<dyn RoleStore>) -> Self {
        Self { store }
    }

    /// Decide whether the context's principal may run an operation requiring `required`.
    ///
    /// - empty `required`: allowed without looking at the credential
    /// - missing, invalid or expired credential: `Unauthorized`
    /// - credential subject unknown to the store: `Unauthorized`
    /// - principal without a role: denied
    /// - store failure: propagated
    pub async fn can_activate(
        &self,
        ctx: &IdentityContext,
        required: &[PermissionKind],
    ) -> DomainResult<bool> {
        if required.is_empty() {
            return Ok(true);
        }

        let claims = ctx.claims().ok_or(DomainError::Unauthorized)?;
        let principal = self
            .store
            .find_principal_by_id(claims.sub)
            .await?
            .ok_or(DomainError::Unauthorized)?;

        let Some(role) = principal.role.as_ref() else {
            tracing::warn!(
                principal_id = %principal.id,
                required = ?required,
                "permission denied: principal has no role"
            );
            return Ok(false);
        };

        if required.iter().any(|p| role.allows(*p)) {
            return Ok(true);
        }

        tracing::warn!(
            principal_id = %principal.id,
            role = %role.kind,
            required = ?required,
            "permission denied"
        );
        Ok(false)
    }

    /// Like [`Self::can_activate`], but a denial becomes `Forbidden`.
    pub async fn authorize(
        &self,
        ctx: &IdentityContext,
        required: &[PermissionKind],
    ) -> DomainResult<()> {
        if self.can_activate(ctx, required).await? {
            Ok(())
        } else {
            Err(DomainError::forbidden("missing required permission"))
        }
    }

    pub async fn authorize_operation<O>(&self, ctx: &IdentityContext, op: &O) -> DomainResult<()>
    where
        O: RequiresPermissions + ?Sized,
    {
        self.authorize(ctx, op.required_permissions()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StaticRoleStore, anonymous, context_for, principal_with};
    use crate::{PermissionGrant, RoleKind};
    use PermissionKind::*;

    struct FailingStore;

    #[async_trait]
    impl RoleStore for FailingStore {
        async fn find_principal_by_id(&self, _id: UserId) -> DomainResult<Option<Principal>> {
            Err(DomainError::infrastructure("role store offline"))
        }

        async fn organization_tenant(&self, _id: OrganizationId) -> DomainResult<Option<TenantId>> {
            Err(DomainError::infrastructure("role store offline"))
        }
    }

    struct EditUsers;

    impl RequiresPermissions for EditUsers {
        fn required_permissions(&self) -> &[PermissionKind] {
            &[OrgUsersEdit]
        }
    }

    #[tokio::test]
    async fn empty_requirement_is_open_even_without_credential() {
        let store = StaticRoleStore::default();
        let evaluator = PermissionEvaluator::new(Arc::new(store.clone()));
        let ctx = anonymous(&store);
        assert!(evaluator.can_activate(&ctx, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn missing_credential_is_unauthorized() {
        let store = StaticRoleStore::default();
        let evaluator = PermissionEvaluator::new(Arc::new(store.clone()));
        let ctx = anonymous(&store);
        let err = evaluator.can_activate(&ctx, &[OrgUsersView]).await.unwrap_err();
        assert_eq!(err, DomainError::Unauthorized);
    }

    #[tokio::test]
    async fn view_only_principal_scenario() {
        let store = StaticRoleStore::default();
        let principal = principal_with(RoleKind::Viewer, &[PermissionGrant::enabled(OrgUsersView)]);
        store.insert(principal.clone());
        let ctx = context_for(&store, &principal);
        let evaluator = PermissionEvaluator::new(Arc::new(store));

        let err = evaluator.authorize_operation(&ctx, &EditUsers).await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        assert!(evaluator.can_activate(&ctx, &[OrgUsersView, OrgUsersEdit]).await.unwrap());
        assert!(!ctx.has_all_permissions(&[OrgUsersView, OrgUsersEdit], false).unwrap());
    }

    #[tokio::test]
    async fn disabled_grant_denies() {
        let store = StaticRoleStore::default();
        let principal = principal_with(RoleKind::Employee, &[PermissionGrant::disabled(OrgUsersEdit)]);
        store.insert(principal.clone());
        let ctx = context_for(&store, &principal);
        let evaluator = PermissionEvaluator::new(Arc::new(store));
        assert!(!evaluator.can_activate(&ctx, &[OrgUsersEdit]).await.unwrap());
    }

    #[tokio::test]
    async fn principal_without_role_is_denied() {
        let store = StaticRoleStore::default();
        let mut principal = principal_with(RoleKind::Employee, &[]);
        principal.role = None;
        store.insert(principal.clone());
        let ctx = context_for(&store, &principal);
        let evaluator = PermissionEvaluator::new(Arc::new(store));
        assert!(!evaluator.can_activate(&ctx, &[TimeTracker]).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_subject_is_unauthorized() {
        let store = StaticRoleStore::default();
        let principal = principal_with(RoleKind::Admin, &[PermissionGrant::enabled(OrgUsersEdit)]);
        let ctx = context_for(&store, &principal);
        let evaluator = PermissionEvaluator::new(Arc::new(store));
        let err = evaluator.can_activate(&ctx, &[OrgUsersEdit]).await.unwrap_err();
        assert_eq!(err, DomainError::Unauthorized);
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let store = StaticRoleStore::default();
        let principal = principal_with(RoleKind::Admin, &[PermissionGrant::enabled(OrgUsersEdit)]);
        let ctx = context_for(&store, &principal);
        let evaluator = PermissionEvaluator::new(Arc::new(FailingStore));
        let err = evaluator.can_activate(&ctx, &[OrgUsersEdit]).await.unwrap_err();
        assert!(matches!(err, DomainError::Infrastructure(_)));
    }
}
