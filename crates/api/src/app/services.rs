//! Infrastructure wiring: storage, identity resolution, handlers and workers.

use std::sync::Arc;

use worklane_auth::{Hs256CredentialDecoder, IdentityResolver, PermissionEvaluator};
use worklane_core::DomainError;
use worklane_events::{InMemoryNotificationBus, NotificationEnvelope};
use worklane_infra::handlers::{
    CreateRolePermission, CreateTenant, CreateTenantHandler, DeleteRolePermission,
    FindMyPermissions, FindRolePermissions, GrantQueryHandler, RolePermissionHandler,
    UpdateRolePermission,
};
use worklane_infra::{
    GenericDataAccessService, MutationDispatcher, NotificationWorker, StoragePort, StoreRoleStore,
    WorkerHandle,
};
use worklane_tenancy::{DEFAULT_TENANT_SETTINGS, Organization, TenancyNotification, TenantSetting};

use crate::config::{ApiConfig, StartupError};

pub type TenancyBus = Arc<InMemoryNotificationBus<NotificationEnvelope<TenancyNotification>>>;

pub struct AppServices {
    pub storage: Arc<dyn StoragePort>,
    pub users: StoreRoleStore,
    pub resolver: Arc<IdentityResolver>,
    pub evaluator: PermissionEvaluator,
    pub organizations: GenericDataAccessService<Organization>,
    pub dispatcher: MutationDispatcher,
    pub bus: TenancyBus,
    _audit: WorkerHandle,
}

pub async fn build_services(config: &ApiConfig) -> Result<AppServices, StartupError> {
    let storage = config.storage.connect().await?;
    let users = StoreRoleStore::new(Arc::clone(&storage));

    let resolver = Arc::new(IdentityResolver::new(
        Arc::new(Hs256CredentialDecoder::new(config.jwt_secret.as_bytes())),
        Arc::new(users.clone()),
    ));
    let evaluator = PermissionEvaluator::new(Arc::new(users.clone()));

    let bus: TenancyBus = Arc::new(InMemoryNotificationBus::new());
    let grants = RolePermissionHandler::new(Arc::clone(&storage), evaluator.clone(), Arc::clone(&bus));
    let grant_queries = GrantQueryHandler::new(Arc::clone(&storage));

    let dispatcher = MutationDispatcher::new()
        .with::<CreateTenant, _>(CreateTenantHandler::new(
            Arc::clone(&storage),
            users.clone(),
            Arc::clone(&bus),
        ))?
        .with::<CreateRolePermission, _>(grants.clone())?
        .with::<UpdateRolePermission, _>(grants.clone())?
        .with::<DeleteRolePermission, _>(grants)?
        .with::<FindMyPermissions, _>(grant_queries.clone())?
        .with::<FindRolePermissions, _>(grant_queries)?;

    // Audit feed: fire-and-forget, reads only the envelope snapshot.
    let audit = NotificationWorker::spawn(
        "tenancy.audit",
        Arc::clone(&bus),
        None,
        |env: NotificationEnvelope<TenancyNotification>| {
            let snapshot = env.context();
            tracing::info!(
                kind = env.kind(),
                tenant_id = %env.tenant_id(),
                user_id = ?snapshot.user_id,
                context_id = %snapshot.context_id,
                "tenancy notification"
            );
            Ok::<(), DomainError>(())
        },
    )?;

    let services = AppServices {
        organizations: GenericDataAccessService::new(Arc::clone(&storage)),
        storage,
        users,
        resolver,
        evaluator,
        dispatcher,
        bus,
        _audit: audit,
    };
    seed_global_defaults(&services).await?;
    Ok(services)
}

/// Platform-wide setting rows (`tenant_id = null`). Existing rows are kept.
pub async fn seed_global_defaults(services: &AppServices) -> Result<(), DomainError> {
    let settings = GenericDataAccessService::<TenantSetting>::new(Arc::clone(&services.storage));
    for (key, value) in DEFAULT_TENANT_SETTINGS {
        match settings.create_global_default(TenantSetting::new(*key, *value)).await {
            Ok(_) | Err(DomainError::Conflict(_)) => {}
            Err(e) => return Err(e),
        }
    }
    tracing::debug!(count = DEFAULT_TENANT_SETTINGS.len(), "global default settings ready");
    Ok(())
}
