//! Per-request identity context.
//!
//! Every service method takes `&IdentityContext` explicitly. The task-local
//! binding behind [`IdentityContext::current`] exists for edges that cannot
//! receive a parameter (extractors, log enrichment, deferred work spawned with
//! [`spawn_in_context`]). Once the owning request ends the binding reads as
//! absent, never as another request's context.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::task::futures::TaskLocalFuture;
use uuid::Uuid;

use worklane_core::{
    ContextSnapshot, DomainError, DomainResult, EmployeeId, OrganizationId, RoleId, TenantId,
    UserId,
};

use crate::permissions::{MatchPolicy, grants_satisfy};
use crate::{
    BearerCredential, CredentialClaims, CredentialDecoder, PermissionKind, Principal, RoleKind,
    RoleStore,
};

tokio::task_local! {
    static CURRENT: Arc<IdentityContext>;
}

pub const DEFAULT_LANGUAGE: &str = "en";

/// Transport-agnostic inputs a context is built from.
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    /// Raw `Authorization` header value.
    pub authorization: Option<String>,
    /// Raw `Organization-Id` header value.
    pub organization_id: Option<String>,
    /// Raw `Language` header value.
    pub language: Option<String>,
}

/// Credential decoder plus role store: everything needed to resolve a principal.
pub struct IdentityResolver {
    decoder: Arc<dyn CredentialDecoder>,
    store: Arc<dyn RoleStore>,
}

impl IdentityResolver {
    pub fn new(decoder: Arc<dyn CredentialDecoder>, store: Arc<dyn RoleStore>) -> Self {
        Self { decoder, store }
    }

    pub fn store(&self) -> &Arc<dyn RoleStore> {
        &self.store
    }
}

/// The current request's principal, tenant, organization and credential.
///
/// Immutable once the principal has been resolved. Derived contexts (see
/// [`IdentityContext::with_bootstrap_tenant`]) are new values.
pub struct IdentityContext {
    id: Uuid,
    credential: Option<BearerCredential>,
    requested_organization: Option<OrganizationId>,
    organization: OnceCell<Option<OrganizationId>>,
    language: String,
    resolver: Option<Arc<IdentityResolver>>,
    claims: OnceLock<Option<CredentialClaims>>,
    principal: OnceCell<Option<Principal>>,
    tenant_override: Option<TenantId>,
    live: Arc<AtomicBool>,
}

impl core::fmt::Debug for IdentityContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdentityContext")
            .field("id", &self.id)
            .field("credential", &self.credential)
            .field("requested_organization", &self.requested_organization)
            .field("tenant_override", &self.tenant_override)
            .field("live", &self.is_live())
            .finish_non_exhaustive()
    }
}

impl IdentityContext {
    pub fn new(meta: RequestMetadata, resolver: Option<Arc<IdentityResolver>>) -> Self {
        let credential = meta
            .authorization
            .as_deref()
            .and_then(BearerCredential::from_authorization);

        let requested_organization = meta.organization_id.as_deref().and_then(|raw| {
            raw.trim()
                .parse::<OrganizationId>()
                .inspect_err(|e| tracing::debug!(error = %e, "ignoring malformed organization header"))
                .ok()
        });

        let language = meta
            .language
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        Self {
            id: Uuid::new_v4(),
            credential,
            requested_organization,
            organization: OnceCell::new(),
            language,
            resolver,
            claims: OnceLock::new(),
            principal: OnceCell::new(),
            tenant_override: None,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Allocate a context for one inbound request.
    pub fn create(meta: RequestMetadata, resolver: Option<Arc<IdentityResolver>>) -> ContextHandle {
        ContextHandle {
            ctx: Arc::new(Self::new(meta, resolver)),
        }
    }

    /// Context for work that runs outside any request but on behalf of a tenant.
    pub fn system(tenant_id: TenantId) -> Self {
        let mut ctx = Self::new(RequestMetadata::default(), None);
        ctx.tenant_override = Some(tenant_id);
        ctx.principal = OnceCell::new_with(Some(None));
        ctx
    }

    /// Context with an already-resolved principal and optional claims.
    pub fn for_principal(principal: Principal, claims: Option<CredentialClaims>) -> Self {
        let mut ctx = Self::new(RequestMetadata::default(), None);
        ctx.principal = OnceCell::new_with(Some(Some(principal)));
        ctx.claims = OnceLock::from(claims);
        ctx
    }

    /// The context bound to the current task, if any.
    ///
    /// Returns `None` outside a request scope and after the owning request
    /// has ended.
    pub fn current() -> Option<Arc<IdentityContext>> {
        CURRENT
            .try_with(Arc::clone)
            .ok()
            .filter(|ctx| ctx.is_live())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn language_code(&self) -> &str {
        &self.language
    }

    /// The organization named by the `Organization-Id` header, once it is
    /// confirmed to be a live organization of the caller's tenant. Anything
    /// else reads as absent.
    pub async fn current_organization_id(&self) -> Option<OrganizationId> {
        let requested = self.requested_organization?;
        *self
            .organization
            .get_or_init(|| self.verify_organization(requested))
            .await
    }

    async fn verify_organization(&self, requested: OrganizationId) -> Option<OrganizationId> {
        let tenant = self.current_tenant_id().await?;
        let resolver = self.resolver.as_ref()?;
        match resolver.store.organization_tenant(requested).await {
            Ok(Some(owner)) if owner == tenant => Some(requested),
            Ok(_) => {
                tracing::warn!(
                    context_id = %self.id,
                    organization_id = %requested,
                    tenant_id = %tenant,
                    "ignoring organization header outside the caller's tenant"
                );
                None
            }
            Err(e) => {
                tracing::warn!(context_id = %self.id, error = %e, "organization lookup failed");
                None
            }
        }
    }

    /// Decoded, signature-checked claims of the bound credential.
    pub fn claims(&self) -> Option<&CredentialClaims> {
        self.claims
            .get_or_init(|| {
                let token = self.credential.as_ref()?;
                let resolver = self.resolver.as_ref()?;
                resolver
                    .decoder
                    .decode(token.expose(), Utc::now())
                    .inspect_err(|e| tracing::debug!(context_id = %self.id, error = %e, "credential rejected"))
                    .ok()
            })
            .as_ref()
    }

    pub fn current_token(&self, throw_if_absent: bool) -> DomainResult<Option<&BearerCredential>> {
        match (&self.credential, throw_if_absent) {
            (None, true) => Err(DomainError::Unauthorized),
            (cred, _) => Ok(cred.as_ref()),
        }
    }

    /// Resolve the principal from the credential, caching it for the request.
    ///
    /// Store failures propagate. An absent principal is `Unauthorized` only
    /// when `throw_if_absent` is set.
    pub async fn current_principal(&self, throw_if_absent: bool) -> DomainResult<Option<&Principal>> {
        let principal = self
            .principal
            .get_or_try_init(|| async {
                let Some(claims) = self.claims() else {
                    return Ok(None);
                };
                let Some(resolver) = self.resolver.as_ref() else {
                    return Ok(None);
                };
                resolver.store.find_principal_by_id(claims.sub).await
            })
            .await?
            .as_ref();

        match (principal, throw_if_absent) {
            (None, true) => Err(DomainError::Unauthorized),
            (p, _) => Ok(p),
        }
    }

    /// Tenant of the current principal (or the system/bootstrap tenant).
    ///
    /// Store failures read as "no tenant" here; use
    /// [`Self::require_tenant_id`] where they must propagate.
    pub async fn current_tenant_id(&self) -> Option<TenantId> {
        self.resolve_tenant()
            .await
            .inspect_err(|e| tracing::warn!(context_id = %self.id, error = %e, "tenant lookup failed"))
            .ok()
            .flatten()
    }

    /// Tenant that every scoped operation must use. `Forbidden` when absent.
    pub async fn require_tenant_id(&self) -> DomainResult<TenantId> {
        self.resolve_tenant()
            .await?
            .ok_or_else(|| DomainError::forbidden("no tenant bound to the request"))
    }

    async fn resolve_tenant(&self) -> DomainResult<Option<TenantId>> {
        if let Some(tenant) = self.tenant_override {
            return Ok(Some(tenant));
        }
        Ok(self.current_principal(false).await?.and_then(|p| p.tenant_id))
    }

    pub async fn current_user_id(&self) -> Option<UserId> {
        match self.current_principal(false).await {
            Ok(Some(p)) => Some(p.id),
            _ => self.claims().map(|c| c.sub),
        }
    }

    pub async fn current_role_id(&self) -> Option<RoleId> {
        self.current_principal(false)
            .await
            .ok()
            .flatten()
            .and_then(|p| p.role_id)
    }

    /// The principal's employee record.
    ///
    /// `None` for principals allowed to act as any employee
    /// (`CHANGE_SELECTED_EMPLOYEE`), who must pick one explicitly.
    pub async fn current_employee_id(&self) -> Option<EmployeeId> {
        if self
            .has_permission(PermissionKind::ChangeSelectedEmployee, false)
            .unwrap_or(false)
        {
            return None;
        }
        self.current_principal(false)
            .await
            .ok()
            .flatten()
            .and_then(|p| p.employee_id)
    }

    /// ALL-match against the credential's permissions.
    pub fn has_permission(&self, permission: PermissionKind, throw_if_absent: bool) -> DomainResult<bool> {
        self.has_all_permissions(&[permission], throw_if_absent)
    }

    /// `true` iff every requested permission is granted.
    pub fn has_all_permissions(
        &self,
        permissions: &[PermissionKind],
        throw_if_absent: bool,
    ) -> DomainResult<bool> {
        self.match_permissions(permissions, MatchPolicy::All, throw_if_absent)
    }

    /// `true` iff at least one requested permission is granted.
    pub fn has_any_permission(
        &self,
        permissions: &[PermissionKind],
        throw_if_absent: bool,
    ) -> DomainResult<bool> {
        self.match_permissions(permissions, MatchPolicy::Any, throw_if_absent)
    }

    fn match_permissions(
        &self,
        requested: &[PermissionKind],
        policy: MatchPolicy,
        throw_if_absent: bool,
    ) -> DomainResult<bool> {
        let Some(claims) = self.claims() else {
            return if throw_if_absent {
                Err(DomainError::Unauthorized)
            } else {
                Ok(false)
            };
        };

        let granted = grants_satisfy(&claims.permissions, requested, policy);
        if !granted && throw_if_absent {
            return Err(DomainError::forbidden("missing required permission"));
        }
        Ok(granted)
    }

    pub async fn has_role(&self, role: RoleKind, throw_if_absent: bool) -> DomainResult<bool> {
        self.has_roles(&[role], throw_if_absent).await
    }

    /// `true` if the principal's role is any of `roles`.
    pub async fn has_roles(&self, roles: &[RoleKind], throw_if_absent: bool) -> DomainResult<bool> {
        let kind = self
            .current_principal(throw_if_absent)
            .await?
            .and_then(Principal::role_kind);
        let matched = kind.is_some_and(|k| roles.contains(&k));
        if !matched && throw_if_absent {
            return Err(DomainError::forbidden("role not permitted"));
        }
        Ok(matched)
    }

    /// Detached copy for background work. Never includes the credential.
    pub async fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            context_id: self.id,
            user_id: self.current_user_id().await,
            tenant_id: self.current_tenant_id().await,
            employee_id: self.current_employee_id().await,
            organization_id: self.current_organization_id().await,
            language: self.language.clone(),
            captured_at: Utc::now(),
        }
    }

    /// Derive a context acting inside a freshly created tenant.
    ///
    /// Only for a principal that has no tenant yet; everyone else gets
    /// `Conflict`.
    pub async fn with_bootstrap_tenant(&self, tenant_id: TenantId) -> DomainResult<IdentityContext> {
        let principal = self
            .current_principal(true)
            .await?
            .ok_or(DomainError::Unauthorized)?;
        if principal.tenant_id.is_some() {
            return Err(DomainError::conflict("principal already belongs to a tenant"));
        }

        let mut bootstrapped = principal.clone();
        bootstrapped.tenant_id = Some(tenant_id);

        Ok(IdentityContext {
            id: self.id,
            credential: self.credential.clone(),
            requested_organization: None,
            organization: OnceCell::new(),
            language: self.language.clone(),
            resolver: self.resolver.clone(),
            claims: OnceLock::from(self.claims().cloned()),
            principal: OnceCell::new_with(Some(Some(bootstrapped))),
            tenant_override: Some(tenant_id),
            live: Arc::clone(&self.live),
        })
    }
}

/// Owns a request's context. Dropping it ends the request.
pub struct ContextHandle {
    ctx: Arc<IdentityContext>,
}

impl ContextHandle {
    pub fn context(&self) -> &Arc<IdentityContext> {
        &self.ctx
    }

    /// Run `fut` with this context bound as [`IdentityContext::current`].
    pub fn scope<F: Future>(&self, fut: F) -> TaskLocalFuture<Arc<IdentityContext>, F> {
        CURRENT.scope(Arc::clone(&self.ctx), fut)
    }

    /// End the request explicitly.
    pub fn finish(self) {}
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        self.ctx.live.store(false, Ordering::Release);
    }
}

/// Run `fut` as the body of the request owned by `handle`, then tear it down.
pub async fn request_scope<F: Future>(handle: ContextHandle, fut: F) -> F::Output {
    let out = handle.scope(fut).await;
    handle.finish();
    out
}

/// Spawn a task that inherits the current context binding (if any).
///
/// The spawned task sees the context only while the owning request is alive.
/// Work that must outlive the request should carry a [`ContextSnapshot`].
pub fn spawn_in_context<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match CURRENT.try_with(Arc::clone) {
        Ok(ctx) => tokio::spawn(CURRENT.scope(ctx, fut)),
        Err(_) => tokio::spawn(fut),
    }
}
