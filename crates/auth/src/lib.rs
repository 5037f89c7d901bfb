//! `worklane-auth`: identity context and permission evaluation.
//!
//! This crate is decoupled from HTTP and storage: credentials arrive as
//! [`RequestMetadata`], principals come from a [`RoleStore`].

pub mod authorize;
pub mod claims;
pub mod context;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{PermissionEvaluator, RequiresPermissions, RoleStore};
pub use claims::{
    BearerCredential, CredentialClaims, CredentialDecoder, Hs256CredentialDecoder,
    TokenValidationError, validate_claims,
};
pub use context::{
    ContextHandle, DEFAULT_LANGUAGE, IdentityContext, IdentityResolver, RequestMetadata,
    request_scope, spawn_in_context,
};
pub use permissions::{MatchPolicy, PermissionGrant, PermissionKind, UnknownPermission};
pub use principal::{Principal, RoleGrants};
pub use roles::{RoleKind, UnknownRole};
