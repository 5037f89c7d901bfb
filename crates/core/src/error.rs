//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// This is the classification every layer surfaces to callers. `NotFound` is
/// deliberately uninformative: a row that does not exist and a row owned by a
/// different tenant produce the same value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input or query descriptor).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// No resolvable principal (missing, invalid or expired credential).
    #[error("unauthorized")]
    Unauthorized,

    /// Principal resolved but not allowed, or no tenant bound to the context.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The target row is absent or not visible to the current tenant.
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. duplicate unique value within a tenant).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A backing store or external collaborator failed.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn infrastructure(msg: impl Into<String>) -> Self {
        Self::Infrastructure(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// `true` for the two access-denial classes (`Unauthorized`, `Forbidden`).
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::Forbidden(_))
    }
}
