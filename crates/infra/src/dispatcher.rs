//! Mutation routing.
//!
//! A [`MutationDispatcher`] holds exactly one handler per mutation type and
//! routes each dispatched value to it together with the caller's
//! [`IdentityContext`]. It does no orchestration itself; multi-step work and
//! its compensation live in the handlers.
//!
//! ```text
//! mutation ──► lookup by TypeId ──► handler.handle(ctx, mutation) ──► output
//!                   │
//!                   └─ none registered ──► DispatchError::NoHandler
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use worklane_auth::IdentityContext;
use worklane_core::DomainError;
use worklane_events::{DispatchError, Mutation, MutationHandler};

type ErasedHandler = Box<dyn Any + Send + Sync>;

/// Registry of mutation handlers keyed by mutation type.
#[derive(Default)]
pub struct MutationDispatcher {
    handlers: HashMap<TypeId, ErasedHandler>,
}

impl core::fmt::Debug for MutationDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MutationDispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl MutationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `M`. A second registration for the same type fails.
    pub fn register<M, H>(&mut self, handler: H) -> Result<(), DispatchError>
    where
        M: Mutation,
        H: MutationHandler<M>,
    {
        let key = TypeId::of::<M>();
        if self.handlers.contains_key(&key) {
            return Err(DispatchError::DuplicateHandler(M::NAME));
        }
        let handler: Arc<dyn MutationHandler<M>> = Arc::new(handler);
        self.handlers.insert(key, Box::new(handler));
        tracing::debug!(mutation = M::NAME, "registered mutation handler");
        Ok(())
    }

    /// Builder-style [`Self::register`].
    pub fn with<M, H>(mut self, handler: H) -> Result<Self, DispatchError>
    where
        M: Mutation,
        H: MutationHandler<M>,
    {
        self.register::<M, H>(handler)?;
        Ok(self)
    }

    pub fn handles<M: Mutation>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<M>())
    }

    pub async fn dispatch<M: Mutation>(
        &self,
        ctx: &IdentityContext,
        mutation: M,
    ) -> Result<M::Output, DispatchError> {
        let handler = self
            .handlers
            .get(&TypeId::of::<M>())
            .and_then(|h| h.downcast_ref::<Arc<dyn MutationHandler<M>>>())
            .cloned()
            .ok_or(DispatchError::NoHandler(M::NAME))?;

        tracing::info!(mutation = M::NAME, context_id = %ctx.id(), "dispatching mutation");
        let result = handler.handle(ctx, mutation).await;
        if let Err(e) = &result {
            tracing::warn!(
                mutation = M::NAME,
                context_id = %ctx.id(),
                error = %e,
                "mutation failed"
            );
        }
        result
    }

    /// Dispatch with the context bound to the current request scope.
    pub async fn dispatch_current<M: Mutation>(&self, mutation: M) -> Result<M::Output, DispatchError> {
        let ctx = IdentityContext::current().ok_or(DispatchError::Domain(DomainError::Unauthorized))?;
        self.dispatch(&ctx, mutation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use worklane_auth::RequestMetadata;
    use worklane_core::TenantId;

    #[derive(Debug, Clone)]
    struct Echo(String);

    impl Mutation for Echo {
        type Output = String;
        const NAME: &'static str = "test.echo";
    }

    #[derive(Debug, Clone)]
    struct Unrouted;

    impl Mutation for Unrouted {
        type Output = ();
        const NAME: &'static str = "test.unrouted";
    }

    struct EchoTenant;

    #[async_trait]
    impl MutationHandler<Echo> for EchoTenant {
        async fn handle(&self, ctx: &IdentityContext, mutation: Echo) -> Result<String, DispatchError> {
            let tenant = ctx.require_tenant_id().await?;
            Ok(format!("{}@{tenant}", mutation.0))
        }
    }

    #[tokio::test]
    async fn routes_to_the_registered_handler() {
        let dispatcher = MutationDispatcher::new().with::<Echo, _>(EchoTenant).unwrap();
        let tenant = TenantId::new();
        let ctx = IdentityContext::system(tenant);
        let out = dispatcher.dispatch(&ctx, Echo("hi".into())).await.unwrap();
        assert_eq!(out, format!("hi@{tenant}"));
        assert!(dispatcher.handles::<Echo>());
        assert!(!dispatcher.handles::<Unrouted>());
    }

    #[tokio::test]
    async fn unregistered_and_duplicate_handlers_fail() {
        let mut dispatcher = MutationDispatcher::new();
        dispatcher.register::<Echo, _>(EchoTenant).unwrap();
        assert_eq!(
            dispatcher.register::<Echo, _>(EchoTenant).unwrap_err(),
            DispatchError::DuplicateHandler("test.echo")
        );

        let ctx = IdentityContext::system(TenantId::new());
        assert_eq!(
            dispatcher.dispatch(&ctx, Unrouted).await.unwrap_err(),
            DispatchError::NoHandler("test.unrouted")
        );
    }

    #[tokio::test]
    async fn handler_errors_pass_through() {
        let dispatcher = MutationDispatcher::new().with::<Echo, _>(EchoTenant).unwrap();
        let ctx = IdentityContext::new(RequestMetadata::default(), None);
        let err = dispatcher.dispatch(&ctx, Echo("x".into())).await.unwrap_err();
        assert!(matches!(err, DispatchError::Domain(DomainError::Forbidden(_))));
    }

    #[tokio::test]
    async fn ambient_dispatch_needs_a_request_scope() {
        let dispatcher = MutationDispatcher::new().with::<Echo, _>(EchoTenant).unwrap();
        let err = dispatcher.dispatch_current(Echo("x".into())).await.unwrap_err();
        assert_eq!(err, DispatchError::Domain(DomainError::Unauthorized));

        let handle = IdentityContext::create(RequestMetadata::default(), None);
        let out = worklane_auth::request_scope(handle, dispatcher.dispatch_current(Echo("y".into()))).await;
        // Anonymous request: the handler itself rejects the missing tenant.
        assert!(matches!(out, Err(DispatchError::Domain(DomainError::Forbidden(_)))));
    }
}
