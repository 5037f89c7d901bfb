/// An immutable request to change state (or to read through the dispatcher).
///
/// Mutations carry **intent** only. They never carry a tenant: handlers take the
/// tenant from the `IdentityContext` they are dispatched with, so a payload can
/// never widen its own scope.
///
/// ## Routing
///
/// The dispatcher routes by the mutation's concrete type; exactly one handler
/// is registered per type.
///
/// ## Design Constraints
///
/// Mutations must be:
/// - **Cloneable**: they may be copied for retries and logging
/// - **Send + Sync + 'static**: they cross task boundaries and own all their data
pub trait Mutation: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// What a successful dispatch returns.
    type Output: Send + 'static;

    /// Stable name used in logs and errors.
    const NAME: &'static str;
}
