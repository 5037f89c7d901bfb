//! `worklane-core`: tenant-scoping foundation building blocks.
//!
//! This crate contains **pure** primitives (no IO, no async): identifiers, the
//! error taxonomy, the tenant-scoped record contract and the query descriptor.

pub mod entity;
pub mod error;
pub mod id;
pub mod query;
pub mod snapshot;

pub use entity::{EntityMeta, RelationDef, TenantScopedEntity};
pub use error::{DomainError, DomainResult};
pub use id::{EmployeeId, EntityId, OrganizationId, RoleId, TenantId, UserId};
pub use snapshot::ContextSnapshot;
pub use query::{
    FindOptions, OrderBy, Page, Predicate, QueryDescriptor, SortDirection, StorageQuery, TakePolicy,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
