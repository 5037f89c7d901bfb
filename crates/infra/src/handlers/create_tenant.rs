//! Tenant bootstrap: the first tenant of a principal that has none.
//!
//! ## Steps
//!
//! 1. `tenant`: the tenant row, scoped to itself
//! 2. `roles`: one role per [`RoleKind`]
//! 3. `role_permissions`: every permission kind for every role, enabled per
//!    [`default_permissions`]
//! 4. `tenant_settings`: [`DEFAULT_TENANT_SETTINGS`]
//! 5. `promote_principal`: the caller joins the tenant as `SUPER_ADMIN`,
//!    only if it is still tenantless at that moment
//!
//! ## Failure
//!
//! Applied steps are undone newest-first and the error is
//! `PartialFailure { compensated: true }`. If an undo fails, compensation
//! stops there, the tenant row is archived to flag the leftovers, and the
//! error carries `compensated: false`.
//!
//! Losing a promotion race to a concurrent bootstrap by the same principal
//! is reported as the plain `Conflict` a sequential second call would get,
//! once its own rows are undone.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use worklane_auth::{IdentityContext, PermissionKind, RoleKind};
use worklane_core::entity::{self, fields};
use worklane_core::{DomainError, EntityId, Predicate, TenantId, TenantScopedEntity, UserId};
use worklane_events::{
    DispatchError, Mutation, MutationHandler, NotificationBus, NotificationEnvelope,
};
use worklane_tenancy::{
    DEFAULT_TENANT_SETTINGS, Role, RolePermission, TenancyNotification, Tenant, TenantSetting,
    default_permissions,
};

use crate::data_access::GenericDataAccessService;
use crate::role_store::StoreRoleStore;
use crate::storage::StoragePort;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTenant {
    pub name: String,
}

impl Mutation for CreateTenant {
    type Output = Tenant;
    const NAME: &'static str = "tenancy.create_tenant";
}

enum Applied {
    Row {
        collection: &'static str,
        id: EntityId,
    },
    Promotion(UserId),
}

type StepError = (&'static str, DomainError);

pub struct CreateTenantHandler<B> {
    storage: Arc<dyn StoragePort>,
    users: StoreRoleStore,
    bus: B,
}

impl<B> CreateTenantHandler<B>
where
    B: NotificationBus<NotificationEnvelope<TenancyNotification>> + 'static,
{
    pub fn new(storage: Arc<dyn StoragePort>, users: StoreRoleStore, bus: B) -> Self {
        Self {
            storage,
            users,
            bus,
        }
    }

    async fn bootstrap(
        &self,
        ctx: &IdentityContext,
        user: UserId,
        tenant: Tenant,
        journal: &mut Vec<Applied>,
    ) -> Result<Tenant, StepError> {
        let tenants = GenericDataAccessService::<Tenant>::new(Arc::clone(&self.storage));
        let roles = GenericDataAccessService::<Role>::new(Arc::clone(&self.storage));
        let grants = GenericDataAccessService::<RolePermission>::new(Arc::clone(&self.storage));
        let settings = GenericDataAccessService::<TenantSetting>::new(Arc::clone(&self.storage));

        let tenant = tenants.create(ctx, tenant).await.map_err(|e| ("tenant", e))?;
        journal.push(Applied::Row {
            collection: Tenant::COLLECTION,
            id: tenant.id(),
        });

        let mut created_roles = Vec::with_capacity(RoleKind::ALL.len());
        for kind in RoleKind::ALL {
            let role = roles.create(ctx, Role::new(kind)).await.map_err(|e| ("roles", e))?;
            journal.push(Applied::Row {
                collection: Role::COLLECTION,
                id: role.id(),
            });
            created_roles.push(role);
        }

        for role in &created_roles {
            let defaults = default_permissions(role.name);
            for permission in PermissionKind::ALL {
                let grant = RolePermission::new(role.role_id(), permission, defaults.contains(&permission));
                let grant = grants
                    .create(ctx, grant)
                    .await
                    .map_err(|e| ("role_permissions", e))?;
                journal.push(Applied::Row {
                    collection: RolePermission::COLLECTION,
                    id: grant.id(),
                });
            }
        }

        for (key, value) in DEFAULT_TENANT_SETTINGS {
            let setting = settings
                .create(ctx, TenantSetting::new(*key, *value))
                .await
                .map_err(|e| ("tenant_settings", e))?;
            journal.push(Applied::Row {
                collection: TenantSetting::COLLECTION,
                id: setting.id(),
            });
        }

        let super_admin = created_roles
            .iter()
            .find(|r| r.name == RoleKind::SuperAdmin)
            .map(Role::role_id)
            .ok_or_else(|| ("promote_principal", DomainError::infrastructure("super admin role missing")))?;
        self.users
            .claim_first_tenant(user, tenant.tenant_id(), super_admin)
            .await
            .map_err(|e| ("promote_principal", e))?;
        journal.push(Applied::Promotion(user));

        Ok(tenant)
    }

    async fn compensate(&self, tenant_id: TenantId, journal: Vec<Applied>) -> bool {
        for applied in journal.into_iter().rev() {
            let undone = match applied {
                Applied::Row { collection, id } => self
                    .storage
                    .delete(collection, id)
                    .await
                    .map(|_| ())
                    .map_err(DomainError::from),
                Applied::Promotion(user) => self.users.clear_tenant_role(user).await,
            };
            if let Err(e) = undone {
                tracing::error!(tenant_id = %tenant_id, error = %e, "tenant bootstrap compensation failed");
                self.flag_tenant(tenant_id).await;
                return false;
            }
        }
        true
    }

    /// Archive a half-built tenant so it stays out of normal reads.
    async fn flag_tenant(&self, tenant_id: TenantId) {
        let filter = Predicate::eq(fields::ID, EntityId::from(tenant_id).to_string());
        let archived = async {
            let Some(doc) = self.storage.find_one(Tenant::COLLECTION, &filter).await? else {
                return Ok(false);
            };
            let mut tenant: Tenant = serde_json::from_value(doc)
                .map_err(|e| DomainError::infrastructure(e.to_string()))?;
            tenant.meta.archive(entity::now());
            let doc = serde_json::to_value(&tenant)
                .map_err(|e| DomainError::infrastructure(e.to_string()))?;
            Ok::<_, DomainError>(self.storage.replace(Tenant::COLLECTION, doc).await?)
        };
        match archived.await {
            Ok(true) => tracing::warn!(tenant_id = %tenant_id, "partially created tenant archived"),
            Ok(false) => {}
            Err(e) => tracing::error!(tenant_id = %tenant_id, error = %e, "failed to flag partial tenant"),
        }
    }
}

#[async_trait]
impl<B> MutationHandler<CreateTenant> for CreateTenantHandler<B>
where
    B: NotificationBus<NotificationEnvelope<TenancyNotification>> + 'static,
{
    async fn handle(&self, ctx: &IdentityContext, mutation: CreateTenant) -> Result<Tenant, DispatchError> {
        let name = mutation.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("tenant name must not be empty").into());
        }

        let principal = ctx
            .current_principal(true)
            .await?
            .ok_or(DomainError::Unauthorized)?
            .id;
        let tenant = Tenant::new(name);
        let tenant_id = tenant.tenant_id();
        let boot = ctx.with_bootstrap_tenant(tenant_id).await?;

        let mut journal = Vec::new();
        let tenant = match self.bootstrap(&boot, principal, tenant, &mut journal).await {
            Ok(tenant) => tenant,
            Err((step, source)) => {
                let compensated = self.compensate(tenant_id, journal).await;
                tracing::warn!(
                    context_id = %ctx.id(),
                    tenant_id = %tenant_id,
                    step,
                    compensated,
                    error = %source,
                    "tenant bootstrap failed"
                );
                if compensated && step == "promote_principal" && matches!(source, DomainError::Conflict(_)) {
                    return Err(source.into());
                }
                return Err(DispatchError::PartialFailure {
                    step,
                    compensated,
                    source,
                });
            }
        };

        tracing::info!(
            context_id = %ctx.id(),
            tenant_id = %tenant_id,
            principal_id = %principal,
            "tenant created"
        );

        let notification = TenancyNotification::TenantCreated {
            tenant_id,
            name: tenant.name.clone(),
        };
        let envelope = NotificationEnvelope::new(tenant_id, notification.kind(), boot.snapshot().await, notification);
        if let Err(e) = self.bus.publish(envelope) {
            tracing::warn!(tenant_id = %tenant_id, error = ?e, "failed to publish tenant_created");
        }

        Ok(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{FlakyStore, context_for, principal};
    use crate::storage::{InMemoryStore, SqliteStore};
    use std::time::Duration;
    use worklane_auth::RoleStore;
    use worklane_events::InMemoryNotificationBus;
    use worklane_tenancy::UserRecord;

    type Bus = Arc<InMemoryNotificationBus<NotificationEnvelope<TenancyNotification>>>;

    async fn setup(storage: Arc<dyn StoragePort>) -> (CreateTenantHandler<Bus>, StoreRoleStore, Bus, UserId) {
        let users = StoreRoleStore::new(Arc::clone(&storage));
        let user = users.register_user(UserRecord::new("founder@example.com")).await.unwrap();
        let bus: Bus = Arc::new(InMemoryNotificationBus::new());
        let handler = CreateTenantHandler::new(storage, users.clone(), Arc::clone(&bus));
        (handler, users, bus, user.user_id())
    }

    async fn rows(storage: &Arc<dyn StoragePort>, collection: &str) -> u64 {
        storage.count(collection, &Predicate::All).await.unwrap()
    }

    #[tokio::test]
    async fn bootstraps_roles_grants_settings_and_promotes() {
        let storage: Arc<dyn StoragePort> = Arc::new(InMemoryStore::new());
        let (handler, users, bus, user) = setup(Arc::clone(&storage)).await;
        let sub = bus.subscribe();

        let ctx = context_for(&users, &principal(&users, user).await);
        let tenant = handler
            .handle(&ctx, CreateTenant { name: " Acme ".into() })
            .await
            .unwrap();
        assert_eq!(tenant.name, "Acme");
        assert_eq!(tenant.meta.tenant_id, Some(tenant.tenant_id()));

        assert_eq!(rows(&storage, Tenant::COLLECTION).await, 1);
        assert_eq!(rows(&storage, Role::COLLECTION).await, RoleKind::ALL.len() as u64);
        assert_eq!(
            rows(&storage, RolePermission::COLLECTION).await,
            (RoleKind::ALL.len() * PermissionKind::ALL.len()) as u64
        );
        assert_eq!(rows(&storage, TenantSetting::COLLECTION).await, DEFAULT_TENANT_SETTINGS.len() as u64);

        let promoted = users.find_principal_by_id(user).await.unwrap().unwrap();
        assert_eq!(promoted.tenant_id, Some(tenant.tenant_id()));
        let role = promoted.role.unwrap();
        assert_eq!(role.kind, RoleKind::SuperAdmin);
        assert!(PermissionKind::ALL.iter().all(|p| role.allows(*p)));

        let envelope = sub.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(envelope.kind(), "tenant_created");
        assert_eq!(envelope.tenant_id(), tenant.tenant_id());
        assert_eq!(envelope.context().tenant_id, Some(tenant.tenant_id()));
        assert_eq!(envelope.context().user_id, Some(user));
    }

    #[tokio::test]
    async fn principal_with_a_tenant_cannot_bootstrap_again() {
        let storage: Arc<dyn StoragePort> = Arc::new(InMemoryStore::new());
        let (handler, users, _bus, user) = setup(Arc::clone(&storage)).await;

        let ctx = context_for(&users, &principal(&users, user).await);
        handler.handle(&ctx, CreateTenant { name: "First".into() }).await.unwrap();

        let ctx = context_for(&users, &principal(&users, user).await);
        let err = handler
            .handle(&ctx, CreateTenant { name: "Second".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Domain(DomainError::Conflict(_))));
        assert_eq!(rows(&storage, Tenant::COLLECTION).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_bootstraps_by_one_principal_yield_one_tenant() {
        let sqlite = SqliteStore::in_memory().await.unwrap();
        let backends: [Arc<dyn StoragePort>; 2] = [Arc::new(InMemoryStore::new()), Arc::new(sqlite)];

        for storage in backends {
            let (handler, users, _bus, user) = setup(Arc::clone(&storage)).await;
            let first = context_for(&users, &principal(&users, user).await);
            let second = context_for(&users, &principal(&users, user).await);

            let (a, b) = tokio::join!(
                handler.handle(&first, CreateTenant { name: "North".into() }),
                handler.handle(&second, CreateTenant { name: "South".into() }),
            );
            let (won, lost) = match (a, b) {
                (Ok(t), Err(e)) | (Err(e), Ok(t)) => (t, e),
                other => panic!("expected exactly one bootstrap to win: {other:?}"),
            };
            assert!(matches!(lost, DispatchError::Domain(DomainError::Conflict(_))), "{lost:?}");

            assert_eq!(rows(&storage, Tenant::COLLECTION).await, 1);
            assert_eq!(rows(&storage, Role::COLLECTION).await, RoleKind::ALL.len() as u64);
            assert_eq!(rows(&storage, TenantSetting::COLLECTION).await, DEFAULT_TENANT_SETTINGS.len() as u64);
            let owner = principal(&users, user).await;
            assert_eq!(owner.tenant_id, Some(won.tenant_id()));
        }
    }

    #[tokio::test]
    async fn anonymous_and_blank_requests_are_rejected() {
        let storage: Arc<dyn StoragePort> = Arc::new(InMemoryStore::new());
        let (handler, users, _bus, user) = setup(Arc::clone(&storage)).await;

        let anonymous = IdentityContext::new(Default::default(), None);
        let err = handler.handle(&anonymous, CreateTenant { name: "x".into() }).await.unwrap_err();
        assert_eq!(err, DispatchError::Domain(DomainError::Unauthorized));

        let ctx = context_for(&users, &principal(&users, user).await);
        let err = handler.handle(&ctx, CreateTenant { name: "  ".into() }).await.unwrap_err();
        assert!(matches!(err, DispatchError::Domain(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn failure_midway_is_fully_compensated() {
        let storage: Arc<dyn StoragePort> = Arc::new(FlakyStore::new(Some(TenantSetting::COLLECTION), None));
        let (handler, users, bus, user) = setup(Arc::clone(&storage)).await;
        let sub = bus.subscribe();

        let ctx = context_for(&users, &principal(&users, user).await);
        let err = handler.handle(&ctx, CreateTenant { name: "Doomed".into() }).await.unwrap_err();
        let DispatchError::PartialFailure { step, compensated, source } = err else {
            panic!("expected a partial failure");
        };
        assert_eq!(step, "tenant_settings");
        assert!(compensated);
        assert!(matches!(source, DomainError::Infrastructure(_)));

        for collection in [Tenant::COLLECTION, Role::COLLECTION, RolePermission::COLLECTION] {
            assert_eq!(rows(&storage, collection).await, 0, "{collection}");
        }
        assert_eq!(principal(&users, user).await.tenant_id, None);
        assert!(sub.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_compensation_leaves_an_archived_tenant() {
        let storage: Arc<dyn StoragePort> = Arc::new(FlakyStore::new(
            Some(TenantSetting::COLLECTION),
            Some(RolePermission::COLLECTION),
        ));
        let (handler, users, _bus, user) = setup(Arc::clone(&storage)).await;

        let ctx = context_for(&users, &principal(&users, user).await);
        let err = handler.handle(&ctx, CreateTenant { name: "Stuck".into() }).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::PartialFailure { step: "tenant_settings", compensated: false, .. }
        ));

        let flagged = storage
            .find_one(Tenant::COLLECTION, &Predicate::eq(fields::IS_ARCHIVED, true))
            .await
            .unwrap();
        assert!(flagged.is_some());
        assert_eq!(rows(&storage, Role::COLLECTION).await, RoleKind::ALL.len() as u64);
    }
}
