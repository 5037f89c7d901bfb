//! Role permission grants: create, toggle, delete, list, and "what can I do".
//!
//! Changing grants needs `CHANGE_ROLES_PERMISSIONS` (checked against the role
//! store) and a `SUPER_ADMIN` or `ADMIN` role. Nobody edits `SUPER_ADMIN`
//! grants, and an `ADMIN` cannot edit `ADMIN` grants.
//!
//! Listing is filtered by the caller's role: `SUPER_ADMIN` sees every grant in
//! the tenant, a grant manager sees all but the `SUPER_ADMIN` grants, anyone
//! else only their own role's grants.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use worklane_auth::{IdentityContext, PermissionEvaluator, PermissionKind, RequiresPermissions, RoleKind};
use worklane_core::{
    DomainError, DomainResult, EntityId, FindOptions, Page, Predicate, QueryDescriptor, RoleId,
};
use worklane_events::{
    DispatchError, Mutation, MutationHandler, NotificationBus, NotificationEnvelope,
};
use worklane_tenancy::{Role, RolePermission, TenancyNotification};

use crate::data_access::GenericDataAccessService;
use crate::storage::StoragePort;

const CHANGE_GRANTS: &[PermissionKind] = &[PermissionKind::ChangeRolesPermissions];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRolePermission {
    pub role_id: RoleId,
    pub permission: PermissionKind,
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl Mutation for CreateRolePermission {
    type Output = RolePermission;
    const NAME: &'static str = "tenancy.create_role_permission";
}

impl RequiresPermissions for CreateRolePermission {
    fn required_permissions(&self) -> &[PermissionKind] {
        CHANGE_GRANTS
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRolePermission {
    pub id: EntityId,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Mutation for UpdateRolePermission {
    type Output = RolePermission;
    const NAME: &'static str = "tenancy.update_role_permission";
}

impl RequiresPermissions for UpdateRolePermission {
    fn required_permissions(&self) -> &[PermissionKind] {
        CHANGE_GRANTS
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRolePermission {
    pub id: EntityId,
}

impl Mutation for DeleteRolePermission {
    type Output = ();
    const NAME: &'static str = "tenancy.delete_role_permission";
}

impl RequiresPermissions for DeleteRolePermission {
    fn required_permissions(&self) -> &[PermissionKind] {
        CHANGE_GRANTS
    }
}

/// The caller's enabled grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FindMyPermissions;

impl Mutation for FindMyPermissions {
    type Output = Vec<RolePermission>;
    const NAME: &'static str = "tenancy.find_my_permissions";
}

/// Grants visible to the caller, optionally narrowed to one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FindRolePermissions {
    #[serde(default)]
    pub role_id: Option<RoleId>,
}

impl Mutation for FindRolePermissions {
    type Output = Page<RolePermission>;
    const NAME: &'static str = "tenancy.find_role_permissions";
}

/// Handles the three grant-changing mutations.
pub struct RolePermissionHandler<B> {
    evaluator: PermissionEvaluator,
    roles: GenericDataAccessService<Role>,
    grants: GenericDataAccessService<RolePermission>,
    bus: B,
}

impl<B: Clone> Clone for RolePermissionHandler<B> {
    fn clone(&self) -> Self {
        Self {
            evaluator: self.evaluator.clone(),
            roles: self.roles.clone(),
            grants: self.grants.clone(),
            bus: self.bus.clone(),
        }
    }
}

impl<B> RolePermissionHandler<B>
where
    B: NotificationBus<NotificationEnvelope<TenancyNotification>> + 'static,
{
    pub fn new(storage: Arc<dyn StoragePort>, evaluator: PermissionEvaluator, bus: B) -> Self {
        Self {
            evaluator,
            roles: GenericDataAccessService::new(Arc::clone(&storage)),
            grants: GenericDataAccessService::new(storage),
            bus,
        }
    }

    /// Permission + role-hierarchy gate for editing grants of `target`.
    async fn guard<O: RequiresPermissions>(
        &self,
        ctx: &IdentityContext,
        op: &O,
        target: RoleId,
    ) -> DomainResult<()> {
        self.evaluator.authorize_operation(ctx, op).await?;

        let caller = ctx
            .current_principal(true)
            .await?
            .and_then(|p| p.role_kind())
            .ok_or_else(|| DomainError::forbidden("principal has no role"))?;
        if !caller.manages_grants() {
            return Err(DomainError::forbidden("role cannot change permissions"));
        }

        let role = self
            .roles
            .find_one_by_id(ctx, EntityId::from(target), &FindOptions::new())
            .await?;
        let escalates = match role.name {
            RoleKind::SuperAdmin => true,
            RoleKind::Admin => caller == RoleKind::Admin,
            _ => false,
        };
        if escalates {
            tracing::warn!(
                context_id = %ctx.id(),
                caller_role = %caller,
                target_role = %role.name,
                "rejected grant change on privileged role"
            );
            return Err(DomainError::forbidden("cannot change permissions of this role"));
        }
        Ok(())
    }

    async fn notify(&self, ctx: &IdentityContext, grant: &RolePermission, enabled: Option<bool>) {
        let Some(tenant_id) = grant.meta.tenant_id else {
            return;
        };
        let notification = TenancyNotification::RolePermissionChanged {
            role_id: grant.role_id,
            permission: grant.permission,
            enabled,
        };
        let envelope = NotificationEnvelope::new(tenant_id, notification.kind(), ctx.snapshot().await, notification);
        if let Err(e) = self.bus.publish(envelope) {
            tracing::warn!(tenant_id = %tenant_id, error = ?e, "failed to publish role_permission_changed");
        }
    }
}

#[async_trait]
impl<B> MutationHandler<CreateRolePermission> for RolePermissionHandler<B>
where
    B: NotificationBus<NotificationEnvelope<TenancyNotification>> + 'static,
{
    async fn handle(
        &self,
        ctx: &IdentityContext,
        mutation: CreateRolePermission,
    ) -> Result<RolePermission, DispatchError> {
        self.guard(ctx, &mutation, mutation.role_id).await?;

        let mut grant = RolePermission::new(mutation.role_id, mutation.permission, mutation.enabled);
        grant.description = mutation.description;
        let grant = self.grants.create(ctx, grant).await?;

        self.notify(ctx, &grant, Some(grant.enabled)).await;
        Ok(grant)
    }
}

#[async_trait]
impl<B> MutationHandler<UpdateRolePermission> for RolePermissionHandler<B>
where
    B: NotificationBus<NotificationEnvelope<TenancyNotification>> + 'static,
{
    async fn handle(
        &self,
        ctx: &IdentityContext,
        mutation: UpdateRolePermission,
    ) -> Result<RolePermission, DispatchError> {
        let current = self.grants.find_one_by_id(ctx, mutation.id, &FindOptions::new()).await?;
        self.guard(ctx, &mutation, current.role_id).await?;

        let mut patch = Map::new();
        if let Some(enabled) = mutation.enabled {
            patch.insert("enabled".into(), JsonValue::Bool(enabled));
        }
        if let Some(description) = mutation.description {
            patch.insert("description".into(), JsonValue::String(description));
        }
        let grant = self.grants.update(ctx, mutation.id, JsonValue::Object(patch)).await?;

        self.notify(ctx, &grant, Some(grant.enabled)).await;
        Ok(grant)
    }
}

#[async_trait]
impl<B> MutationHandler<DeleteRolePermission> for RolePermissionHandler<B>
where
    B: NotificationBus<NotificationEnvelope<TenancyNotification>> + 'static,
{
    async fn handle(&self, ctx: &IdentityContext, mutation: DeleteRolePermission) -> Result<(), DispatchError> {
        let current = self.grants.find_one_by_id(ctx, mutation.id, &FindOptions::new()).await?;
        self.guard(ctx, &mutation, current.role_id).await?;

        self.grants.delete(ctx, mutation.id).await?;
        self.notify(ctx, &current, None).await;
        Ok(())
    }
}

/// Read side of grants: [`FindMyPermissions`] and [`FindRolePermissions`].
#[derive(Clone)]
pub struct GrantQueryHandler {
    roles: GenericDataAccessService<Role>,
    grants: GenericDataAccessService<RolePermission>,
}

impl GrantQueryHandler {
    pub fn new(storage: Arc<dyn StoragePort>) -> Self {
        Self {
            roles: GenericDataAccessService::new(Arc::clone(&storage)),
            grants: GenericDataAccessService::new(storage),
        }
    }

    /// Ids of every role in the tenant except `SUPER_ADMIN`.
    async fn unprivileged_roles(&self, ctx: &IdentityContext) -> DomainResult<Vec<RoleId>> {
        let descriptor = QueryDescriptor::new()
            .filter(Predicate::ne("name", RoleKind::SuperAdmin.as_str()));
        Ok(self
            .roles
            .find_all(ctx, &descriptor)
            .await?
            .items
            .iter()
            .map(Role::role_id)
            .collect())
    }
}

#[async_trait]
impl MutationHandler<FindMyPermissions> for GrantQueryHandler {
    async fn handle(
        &self,
        ctx: &IdentityContext,
        _query: FindMyPermissions,
    ) -> Result<Vec<RolePermission>, DispatchError> {
        let principal = ctx.current_principal(true).await?.ok_or(DomainError::Unauthorized)?;
        let Some(role_id) = principal.role_id else {
            return Ok(Vec::new());
        };

        let descriptor = QueryDescriptor::new().filter(
            Predicate::eq("role_id", role_id.to_string()).and(Predicate::eq("enabled", true)),
        );
        Ok(self.grants.find_all(ctx, &descriptor).await?.items)
    }
}

#[async_trait]
impl MutationHandler<FindRolePermissions> for GrantQueryHandler {
    async fn handle(
        &self,
        ctx: &IdentityContext,
        query: FindRolePermissions,
    ) -> Result<Page<RolePermission>, DispatchError> {
        let principal = ctx.current_principal(true).await?.ok_or(DomainError::Unauthorized)?;
        let (Some(own_role), Some(grants)) = (principal.role_id, principal.role.as_ref()) else {
            return Ok(Page::empty());
        };

        let visible = if grants.kind == RoleKind::SuperAdmin {
            query.role_id.map(|r| Predicate::eq("role_id", r.to_string()))
        } else if grants.allows(PermissionKind::ChangeRolesPermissions) {
            let allowed = self.unprivileged_roles(ctx).await?;
            match query.role_id {
                Some(r) if allowed.contains(&r) => Some(Predicate::eq("role_id", r.to_string())),
                Some(r) => {
                    tracing::debug!(
                        context_id = %ctx.id(),
                        requested_role = %r,
                        "role outside the caller's reach; listing own grants"
                    );
                    Some(Predicate::eq("role_id", own_role.to_string()))
                }
                None => Some(Predicate::is_in(
                    "role_id",
                    allowed.iter().map(ToString::to_string),
                )),
            }
        } else {
            Some(Predicate::eq("role_id", own_role.to_string()))
        };

        let descriptor = match visible {
            Some(filter) => QueryDescriptor::new().filter(filter),
            None => QueryDescriptor::new(),
        };
        Ok(self.grants.find_all(ctx, &descriptor).await?)
    }
}
