use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use worklane_core::query::compare_documents;
use worklane_core::{EntityId, Predicate, StorageQuery};

use super::{StoragePort, StoreError, conflicting_row, document_id};

type Collection = BTreeMap<EntityId, JsonValue>;

/// In-memory document store for tests and single-process dev runs.
///
/// Evaluates queries with the reference semantics in `worklane_core::query`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Backend("in-memory store lock poisoned".into())
    }
}

#[async_trait]
impl StoragePort for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn count(&self, collection: &str, filter: &Predicate) -> Result<u64, StoreError> {
        let map = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(map
            .get(collection)
            .map(|rows| rows.values().filter(|doc| filter.matches(doc)).count() as u64)
            .unwrap_or(0))
    }

    async fn find(
        &self,
        collection: &str,
        query: &StorageQuery,
    ) -> Result<Vec<JsonValue>, StoreError> {
        let mut matched: Vec<JsonValue> = {
            let map = self.inner.read().map_err(|_| Self::poisoned())?;
            match map.get(collection) {
                Some(rows) => rows
                    .values()
                    .filter(|doc| query.filter.matches(doc))
                    .cloned()
                    .collect(),
                None => return Ok(Vec::new()),
            }
        };

        matched.sort_by(|a, b| compare_documents(a, b, &query.order));

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let take = query
            .take
            .map(|t| usize::try_from(t).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        Ok(matched.into_iter().skip(skip).take(take).collect())
    }

    async fn insert(&self, collection: &str, doc: JsonValue) -> Result<(), StoreError> {
        let id = document_id(&doc)?;
        let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
        let rows = map.entry(collection.to_string()).or_default();
        if rows.contains_key(&id) {
            return Err(StoreError::Conflict(format!("{collection} row {id} already exists")));
        }
        rows.insert(id, doc);
        Ok(())
    }

    async fn replace(&self, collection: &str, doc: JsonValue) -> Result<bool, StoreError> {
        let id = document_id(&doc)?;
        let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
        match map.get_mut(collection).and_then(|rows| rows.get_mut(&id)) {
            Some(slot) => {
                *slot = doc;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_unless(
        &self,
        collection: &str,
        doc: JsonValue,
        conflict: &Predicate,
    ) -> Result<(), StoreError> {
        let id = document_id(&doc)?;
        let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
        let rows = map.entry(collection.to_string()).or_default();
        if rows.contains_key(&id) {
            return Err(StoreError::Conflict(format!("{collection} row {id} already exists")));
        }
        if rows.values().any(|row| conflict.matches(row)) {
            return Err(conflicting_row(collection));
        }
        rows.insert(id, doc);
        Ok(())
    }

    async fn replace_if(
        &self,
        collection: &str,
        doc: JsonValue,
        guard: &Predicate,
        conflict: &Predicate,
    ) -> Result<bool, StoreError> {
        let id = document_id(&doc)?;
        let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
        let Some(rows) = map.get_mut(collection) else {
            return Ok(false);
        };
        if !rows.get(&id).is_some_and(|row| guard.matches(row)) {
            return Ok(false);
        }
        if rows.values().any(|row| conflict.matches(row)) {
            return Err(conflicting_row(collection));
        }
        rows.insert(id, doc);
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: EntityId) -> Result<bool, StoreError> {
        let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
        Ok(map
            .get_mut(collection)
            .is_some_and(|rows| rows.remove(&id).is_some()))
    }
}
