//! Storage port: the capability set both persistence backends implement.
//!
//! The port knows nothing about tenants or soft deletes. It stores JSON
//! documents per collection and evaluates [`StorageQuery`] shapes. Scoping is
//! layered on top by the data-access service, which is the only caller that
//! builds predicates from caller input.
//!
//! ## Contract
//!
//! Adapters must agree on every observable detail of a query:
//!
//! - predicate semantics as defined by [`Predicate::matches`]
//! - ordering as defined by [`compare_documents`](worklane_core::query::compare_documents)
//! - `skip` applied before `take`, both after ordering
//! - `insert` of an existing `(collection, id)` fails with [`StoreError::Conflict`]
//! - the guarded writes (`insert_unless`, `replace_if`) check and write
//!   atomically: no concurrent write can land between the check and the write

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use worklane_core::entity::fields;
use worklane_core::{DomainError, EntityId, Predicate, StorageQuery, TenantId};

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness rule was violated (duplicate id or conflicting row).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A document is missing its id or is not a JSON object.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// A query uses an unsafe field name or a non-scalar value.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The backend failed (connection, lock poisoning, SQL error).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => DomainError::Conflict(msg),
            StoreError::InvalidDocument(msg) | StoreError::InvalidQuery(msg) => {
                DomainError::Validation(msg)
            }
            StoreError::Backend(msg) => DomainError::Infrastructure(msg),
        }
    }
}

/// Document storage shared by every tenant-scoped collection.
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    async fn count(&self, collection: &str, filter: &Predicate) -> Result<u64, StoreError>;

    async fn find(&self, collection: &str, query: &StorageQuery)
    -> Result<Vec<JsonValue>, StoreError>;

    async fn find_one(
        &self,
        collection: &str,
        filter: &Predicate,
    ) -> Result<Option<JsonValue>, StoreError> {
        let mut query = StorageQuery::matching(filter.clone());
        query.take = Some(1);
        Ok(self.find(collection, &query).await?.into_iter().next())
    }

    async fn insert(&self, collection: &str, doc: JsonValue) -> Result<(), StoreError>;

    /// Replace a stored document. `false` when no row has that id.
    async fn replace(&self, collection: &str, doc: JsonValue) -> Result<bool, StoreError>;

    /// Insert `doc` unless some row already matches `conflict`.
    async fn insert_unless(
        &self,
        collection: &str,
        doc: JsonValue,
        conflict: &Predicate,
    ) -> Result<(), StoreError>;

    /// Replace the row with `doc`'s id only while that row matches `guard`.
    ///
    /// `false` when there is no such row or the guard does not hold;
    /// [`StoreError::Conflict`] when any row matches `conflict`.
    async fn replace_if(
        &self,
        collection: &str,
        doc: JsonValue,
        guard: &Predicate,
        conflict: &Predicate,
    ) -> Result<bool, StoreError>;

    /// Remove a row. `false` when no row has that id.
    async fn delete(&self, collection: &str, id: EntityId) -> Result<bool, StoreError>;
}

#[async_trait]
impl<S> StoragePort for Arc<S>
where
    S: StoragePort + ?Sized,
{
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    async fn count(&self, collection: &str, filter: &Predicate) -> Result<u64, StoreError> {
        (**self).count(collection, filter).await
    }

    async fn find(
        &self,
        collection: &str,
        query: &StorageQuery,
    ) -> Result<Vec<JsonValue>, StoreError> {
        (**self).find(collection, query).await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Predicate,
    ) -> Result<Option<JsonValue>, StoreError> {
        (**self).find_one(collection, filter).await
    }

    async fn insert(&self, collection: &str, doc: JsonValue) -> Result<(), StoreError> {
        (**self).insert(collection, doc).await
    }

    async fn replace(&self, collection: &str, doc: JsonValue) -> Result<bool, StoreError> {
        (**self).replace(collection, doc).await
    }

    async fn insert_unless(
        &self,
        collection: &str,
        doc: JsonValue,
        conflict: &Predicate,
    ) -> Result<(), StoreError> {
        (**self).insert_unless(collection, doc, conflict).await
    }

    async fn replace_if(
        &self,
        collection: &str,
        doc: JsonValue,
        guard: &Predicate,
        conflict: &Predicate,
    ) -> Result<bool, StoreError> {
        (**self).replace_if(collection, doc, guard, conflict).await
    }

    async fn delete(&self, collection: &str, id: EntityId) -> Result<bool, StoreError> {
        (**self).delete(collection, id).await
    }
}

/// The `id` of a document.
pub(crate) fn document_id(doc: &JsonValue) -> Result<EntityId, StoreError> {
    if !doc.is_object() {
        return Err(StoreError::InvalidDocument("document must be a JSON object".into()));
    }
    doc.get(fields::ID)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| StoreError::InvalidDocument("document has no string id".into()))?
        .parse::<EntityId>()
        .map_err(|e| StoreError::InvalidDocument(e.to_string()))
}

pub(crate) fn conflicting_row(collection: &str) -> StoreError {
    StoreError::Conflict(format!("a conflicting {collection} row already exists"))
}

/// The `tenant_id` of a document (`None` for tenant-global rows).
pub(crate) fn document_tenant(doc: &JsonValue) -> Option<TenantId> {
    doc.get(fields::TENANT_ID)
        .and_then(JsonValue::as_str)
        .and_then(|raw| raw.parse().ok())
}
