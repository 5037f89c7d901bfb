use async_trait::async_trait;
use thiserror::Error;

use worklane_auth::IdentityContext;
use worklane_core::DomainError;

use crate::Mutation;

/// Failure of a dispatched mutation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("no handler registered for mutation '{0}'")]
    NoHandler(&'static str),

    #[error("a handler is already registered for mutation '{0}'")]
    DuplicateHandler(&'static str),

    /// A multi-step handler failed after applying some steps.
    ///
    /// `compensated == true` means every applied step was undone. Otherwise the
    /// handler's documented partial state remains.
    #[error("step '{step}' failed (compensated: {compensated}): {source}")]
    PartialFailure {
        step: &'static str,
        compensated: bool,
        source: DomainError,
    },
}

impl DispatchError {
    /// The domain classification callers should surface.
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            DispatchError::Domain(e) => Some(e),
            DispatchError::PartialFailure { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Handles one mutation type.
///
/// Handlers read the tenant from `ctx`, never from the mutation, and never
/// touch another tenant's rows.
#[async_trait]
pub trait MutationHandler<M: Mutation>: Send + Sync + 'static {
    async fn handle(&self, ctx: &IdentityContext, mutation: M) -> Result<M::Output, DispatchError>;
}
