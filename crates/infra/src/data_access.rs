//! Tenant-scoped CRUD over any [`TenantScopedEntity`].
//!
//! Every path derives the tenant from the [`IdentityContext`] and conjoins it
//! with the caller's predicate before the storage port is touched. A context
//! without a tenant fails with `Forbidden`; there is no unscoped fallback.
//!
//! Reads see the caller's rows, plus tenant-global (`tenant_id = null`) rows
//! for entities that opt into shared defaults. Writes only ever see the
//! caller's own rows, so global defaults are read-only here and a row owned by
//! another tenant is indistinguishable from a missing one (`NotFound`).

use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use worklane_auth::IdentityContext;
use worklane_core::entity::{self, fields};
use worklane_core::query::{compare_scalars, lookup, sanitize, stable_order};
use worklane_core::{
    DomainError, DomainResult, EntityId, EntityMeta, FindOptions, OrganizationId, Page, Predicate,
    QueryDescriptor, RelationDef, StorageQuery, TakePolicy, TenantId, TenantScopedEntity,
};
use worklane_tenancy::Organization;

use crate::storage::{StoragePort, StoreError};

/// Generic data-access engine for one entity type.
pub struct GenericDataAccessService<T, S = Arc<dyn StoragePort>> {
    storage: S,
    _entity: PhantomData<fn() -> T>,
}

impl<T, S: Clone> Clone for GenericDataAccessService<T, S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T, S> GenericDataAccessService<T, S>
where
    T: TenantScopedEntity,
    S: StoragePort,
{
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            _entity: PhantomData,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub async fn count_by(&self, ctx: &IdentityContext, filter: Predicate) -> DomainResult<u64> {
        filter.validate()?;
        let tenant = ctx.require_tenant_id().await?;
        let scoped = Self::read_scope(tenant)
            .and(Self::visibility(false))
            .and(filter);
        Ok(self.storage.count(T::COLLECTION, &scoped).await?)
    }

    pub async fn exists_by(&self, ctx: &IdentityContext, filter: Predicate) -> DomainResult<bool> {
        Ok(self.count_by(ctx, filter).await? > 0)
    }

    /// Paginated read; `take` is clamped to `[0, MAX_PAGE_SIZE]`.
    pub async fn paginate(
        &self,
        ctx: &IdentityContext,
        descriptor: &QueryDescriptor,
    ) -> DomainResult<Page<T>> {
        let typed = Self::typed_descriptor(descriptor);
        self.query_documents(ctx, &typed, TakePolicy::Clamped)
            .await?
            .try_map(Self::decode)
    }

    /// Like [`Self::paginate`], with requested relations embedded and `select` applied.
    pub async fn paginate_documents(
        &self,
        ctx: &IdentityContext,
        descriptor: &QueryDescriptor,
    ) -> DomainResult<Page<JsonValue>> {
        self.query_documents(ctx, descriptor, TakePolicy::Clamped)
            .await
    }

    /// Unclamped read for internal and administrative callers.
    pub async fn find_all(
        &self,
        ctx: &IdentityContext,
        descriptor: &QueryDescriptor,
    ) -> DomainResult<Page<T>> {
        let typed = Self::typed_descriptor(descriptor);
        self.query_documents(ctx, &typed, TakePolicy::Unbounded)
            .await?
            .try_map(Self::decode)
    }

    pub async fn find_all_documents(
        &self,
        ctx: &IdentityContext,
        descriptor: &QueryDescriptor,
    ) -> DomainResult<Page<JsonValue>> {
        self.query_documents(ctx, descriptor, TakePolicy::Unbounded)
            .await
    }

    /// `NotFound` when the row is absent or not visible to the caller's tenant.
    pub async fn find_one_by_id(
        &self,
        ctx: &IdentityContext,
        id: EntityId,
        options: &FindOptions,
    ) -> DomainResult<T> {
        self.find_one_by(ctx, Predicate::eq(fields::ID, id.to_string()), options)
            .await
    }

    pub async fn find_one_by_id_document(
        &self,
        ctx: &IdentityContext,
        id: EntityId,
        options: &FindOptions,
    ) -> DomainResult<JsonValue> {
        self.find_one_by_document(ctx, Predicate::eq(fields::ID, id.to_string()), options)
            .await
    }

    pub async fn find_one_by(
        &self,
        ctx: &IdentityContext,
        filter: Predicate,
        options: &FindOptions,
    ) -> DomainResult<T> {
        let options = FindOptions {
            relations: Vec::new(),
            select: Vec::new(),
            with_deleted: options.with_deleted,
        };
        Self::decode(self.find_one_by_document(ctx, filter, &options).await?)
    }

    pub async fn find_one_by_document(
        &self,
        ctx: &IdentityContext,
        filter: Predicate,
        options: &FindOptions,
    ) -> DomainResult<JsonValue> {
        let descriptor = QueryDescriptor {
            filter,
            relations: options.relations.clone(),
            select: options.select.clone(),
            order: Vec::new(),
            skip: None,
            take: Some(1),
            with_deleted: options.with_deleted,
        };
        self.query_documents(ctx, &descriptor, TakePolicy::Unbounded)
            .await?
            .items
            .into_iter()
            .next()
            .ok_or(DomainError::NotFound)
    }

    /// Persist a new record owned by the caller's tenant.
    ///
    /// The tenant is always taken from the context; a different `tenant_id` on
    /// the input is overwritten. The bootstrap path goes through a context
    /// derived with [`IdentityContext::with_bootstrap_tenant`].
    pub async fn create(&self, ctx: &IdentityContext, mut entity: T) -> DomainResult<T> {
        let tenant = ctx.require_tenant_id().await?;

        let meta = entity.meta_mut();
        if let Some(supplied) = meta.tenant_id.filter(|t| *t != tenant) {
            tracing::debug!(
                context_id = %ctx.id(),
                collection = T::COLLECTION,
                supplied_tenant = %supplied,
                tenant_id = %tenant,
                "ignoring tenant_id from payload"
            );
        }
        let now = entity::now();
        meta.tenant_id = Some(tenant);
        meta.created_at = now;
        meta.updated_at = now;
        meta.deleted_at = None;
        meta.is_archived = false;
        let organization = meta.organization_id;

        self.ensure_organization(tenant, organization).await?;
        self.insert(Some(tenant), entity, ctx.id().to_string()).await
    }

    /// Create from an untrusted JSON payload (protected fields are ignored).
    pub async fn create_partial(
        &self,
        ctx: &IdentityContext,
        partial: JsonValue,
    ) -> DomainResult<T> {
        let JsonValue::Object(input) = partial else {
            return Err(DomainError::validation("payload must be a JSON object"));
        };

        let mut doc = as_object(serde_json::to_value(EntityMeta::new()).map_err(encode_error)?)?;
        let supplied_tenant = input
            .get(fields::TENANT_ID)
            .and_then(JsonValue::as_str)
            .and_then(|raw| raw.parse::<TenantId>().ok());
        merge_writable::<T>(&mut doc, input);
        if let Some(tenant) = supplied_tenant {
            doc.insert(fields::TENANT_ID.to_string(), JsonValue::String(tenant.to_string()));
        }

        let entity: T = serde_json::from_value(JsonValue::Object(doc))
            .map_err(|e| DomainError::validation(format!("invalid {} payload: {e}", T::COLLECTION)))?;
        self.create(ctx, entity).await
    }

    /// Persist a tenant-global default (`tenant_id = null`), visible to every tenant.
    pub async fn create_global_default(&self, mut entity: T) -> DomainResult<T> {
        if !T::SHARES_GLOBAL_DEFAULTS {
            return Err(DomainError::validation(format!(
                "{} does not support global defaults",
                T::COLLECTION
            )));
        }
        let now = entity::now();
        let meta = entity.meta_mut();
        meta.tenant_id = None;
        meta.organization_id = None;
        meta.created_at = now;
        meta.updated_at = now;
        meta.deleted_at = None;
        meta.is_archived = false;
        self.insert(None, entity, "global".to_string()).await
    }

    /// Merge `patch` into the caller's row. Protected fields are dropped.
    pub async fn update(
        &self,
        ctx: &IdentityContext,
        id: EntityId,
        patch: JsonValue,
    ) -> DomainResult<T> {
        let JsonValue::Object(input) = patch else {
            return Err(DomainError::validation("patch must be a JSON object"));
        };
        let tenant = ctx.require_tenant_id().await?;
        let current = self.load_owned(tenant, id, false).await?;
        let previous_org = current.meta().organization_id;

        let mut doc = as_object(serde_json::to_value(&current).map_err(encode_error)?)?;
        merge_writable::<T>(&mut doc, input);

        let mut updated: T = serde_json::from_value(JsonValue::Object(doc))
            .map_err(|e| DomainError::validation(format!("invalid {} patch: {e}", T::COLLECTION)))?;
        updated.meta_mut().updated_at = entity::now();

        let organization = updated.meta().organization_id;
        if organization != previous_org {
            self.ensure_organization(tenant, organization).await?;
        }

        let doc = self.prepare_write(&updated)?;
        let conflict = Self::unique_conflict(Some(tenant), &doc, Some(id));
        let replaced = self
            .storage
            .replace_if(T::COLLECTION, doc, &Self::write_scope(tenant), &conflict)
            .await
            .map_err(Self::uniqueness_error)?;
        if !replaced {
            return Err(DomainError::NotFound);
        }

        tracing::info!(
            context_id = %ctx.id(),
            collection = T::COLLECTION,
            id = %id,
            "record updated"
        );
        Ok(updated)
    }

    /// Hard delete.
    pub async fn delete(&self, ctx: &IdentityContext, id: EntityId) -> DomainResult<()> {
        let tenant = ctx.require_tenant_id().await?;
        self.load_owned(tenant, id, true).await?;
        if !self.storage.delete(T::COLLECTION, id).await? {
            return Err(DomainError::NotFound);
        }
        tracing::info!(
            context_id = %ctx.id(),
            collection = T::COLLECTION,
            id = %id,
            "record deleted"
        );
        Ok(())
    }

    /// Archive the row. Archiving an archived row returns it unchanged.
    pub async fn soft_remove(&self, ctx: &IdentityContext, id: EntityId) -> DomainResult<T> {
        let tenant = ctx.require_tenant_id().await?;
        let mut current = self.load_owned(tenant, id, true).await?;
        if current.meta().is_soft_deleted() {
            return Ok(current);
        }
        current.meta_mut().archive(entity::now());
        self.replace(current).await
    }

    /// Reverse [`Self::soft_remove`]. A live row is returned unchanged.
    pub async fn soft_recover(&self, ctx: &IdentityContext, id: EntityId) -> DomainResult<T> {
        let tenant = ctx.require_tenant_id().await?;
        let mut current = self.load_owned(tenant, id, true).await?;
        if !current.meta().is_soft_deleted() {
            return Ok(current);
        }
        current.meta_mut().restore(entity::now());
        self.replace(current).await
    }

    fn read_scope(tenant: TenantId) -> Predicate {
        let own = Predicate::eq(fields::TENANT_ID, tenant.to_string());
        if T::SHARES_GLOBAL_DEFAULTS {
            Predicate::any(vec![own, Predicate::is_null(fields::TENANT_ID)])
        } else {
            own
        }
    }

    fn write_scope(tenant: TenantId) -> Predicate {
        Predicate::eq(fields::TENANT_ID, tenant.to_string())
    }

    fn visibility(with_deleted: bool) -> Predicate {
        if with_deleted {
            Predicate::All
        } else {
            Predicate::eq(fields::IS_ARCHIVED, false)
        }
    }

    fn typed_descriptor(descriptor: &QueryDescriptor) -> QueryDescriptor {
        QueryDescriptor {
            relations: Vec::new(),
            select: Vec::new(),
            ..descriptor.clone()
        }
    }

    fn decode(doc: JsonValue) -> DomainResult<T> {
        serde_json::from_value(doc).map_err(|e| {
            DomainError::infrastructure(format!("stored {} row is malformed: {e}", T::COLLECTION))
        })
    }

    async fn query_documents(
        &self,
        ctx: &IdentityContext,
        descriptor: &QueryDescriptor,
        policy: TakePolicy,
    ) -> DomainResult<Page<JsonValue>> {
        let relations = descriptor
            .relations
            .iter()
            .map(|name| {
                T::relation(name).ok_or_else(|| {
                    DomainError::validation(format!("unknown relation '{name}' on {}", T::COLLECTION))
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        let sanitized = sanitize(descriptor, policy)?;
        let tenant = ctx.require_tenant_id().await?;

        let filter = Self::read_scope(tenant)
            .and(Self::visibility(descriptor.with_deleted))
            .and(sanitized.filter);
        let query = StorageQuery {
            filter,
            ..sanitized
        };

        let total = self.storage.count(T::COLLECTION, &query.filter).await?;
        let mut items = if query.take == Some(0) {
            Vec::new()
        } else {
            self.storage.find(T::COLLECTION, &query).await?
        };

        for relation in &relations {
            self.embed_relation(tenant, relation, &mut items).await?;
        }
        if !descriptor.select.is_empty() {
            items = items
                .into_iter()
                .map(|doc| project(&doc, &descriptor.select, &descriptor.relations))
                .collect();
        }

        tracing::debug!(
            context_id = %ctx.id(),
            collection = T::COLLECTION,
            tenant_id = %tenant,
            backend = self.storage.backend(),
            returned = items.len(),
            total,
            "scoped query"
        );
        Ok(Page { items, total })
    }

    /// Load one related collection for all `docs` in a single scoped query.
    async fn embed_relation(
        &self,
        tenant: TenantId,
        relation: &RelationDef,
        docs: &mut [JsonValue],
    ) -> DomainResult<()> {
        let mut keys: Vec<JsonValue> = Vec::new();
        for doc in docs.iter() {
            if let Some(v) = lookup(doc, relation.local_field).filter(|v| is_scalar(v)) {
                if !keys.contains(v) {
                    keys.push(v.clone());
                }
            }
        }

        let related = if keys.is_empty() {
            Vec::new()
        } else {
            let filter = Predicate::eq(fields::TENANT_ID, tenant.to_string())
                .and(Self::visibility(false))
                .and(Predicate::is_in(relation.foreign_field, keys));
            let query = StorageQuery {
                filter,
                order: stable_order(Vec::new()),
                skip: 0,
                take: None,
            };
            self.storage.find(relation.collection, &query).await?
        };

        for doc in docs.iter_mut() {
            let local = lookup(doc, relation.local_field).cloned();
            let mut matches = related.iter().filter(|rel| match (&local, lookup(rel, relation.foreign_field)) {
                (Some(l), Some(f)) if !l.is_null() && !f.is_null() => {
                    compare_scalars(l, f).is_eq()
                }
                _ => false,
            });
            let embedded = if relation.many {
                JsonValue::Array(matches.cloned().collect())
            } else {
                matches.next().cloned().unwrap_or(JsonValue::Null)
            };
            if let JsonValue::Object(map) = doc {
                map.insert(relation.name.to_string(), embedded);
            }
        }
        Ok(())
    }

    /// The caller's own row, archived or not per `with_deleted`.
    async fn load_owned(&self, tenant: TenantId, id: EntityId, with_deleted: bool) -> DomainResult<T> {
        let filter = Self::write_scope(tenant)
            .and(Self::visibility(with_deleted))
            .and(Predicate::eq(fields::ID, id.to_string()));
        let doc = self
            .storage
            .find_one(T::COLLECTION, &filter)
            .await?
            .ok_or(DomainError::NotFound)?;
        Self::decode(doc)
    }

    async fn replace(&self, entity: T) -> DomainResult<T> {
        let doc = self.prepare_write(&entity)?;
        if !self.storage.replace(T::COLLECTION, doc).await? {
            return Err(DomainError::NotFound);
        }
        Ok(entity)
    }

    async fn insert(&self, tenant: Option<TenantId>, entity: T, actor: String) -> DomainResult<T> {
        let doc = self.prepare_write(&entity)?;
        let conflict = Self::unique_conflict(tenant, &doc, None);
        self.storage
            .insert_unless(T::COLLECTION, doc, &conflict)
            .await
            .map_err(Self::uniqueness_error)?;
        tracing::info!(
            actor = %actor,
            collection = T::COLLECTION,
            id = %entity.id(),
            tenant_id = ?tenant,
            "record created"
        );
        Ok(entity)
    }

    /// Serialize for storage, dropping any embedded relation keys.
    fn prepare_write(&self, entity: &T) -> DomainResult<JsonValue> {
        let mut doc = as_object(serde_json::to_value(entity).map_err(encode_error)?)?;
        for relation in T::relations() {
            doc.remove(relation.name);
        }
        Ok(JsonValue::Object(doc))
    }

    async fn ensure_organization(
        &self,
        tenant: TenantId,
        organization: Option<OrganizationId>,
    ) -> DomainResult<()> {
        let Some(organization) = organization else {
            return Ok(());
        };
        let filter = Predicate::eq(fields::TENANT_ID, tenant.to_string())
            .and(Self::visibility(false))
            .and(Predicate::eq(fields::ID, organization.to_string()));
        if self.storage.count(Organization::COLLECTION, &filter).await? == 0 {
            tracing::warn!(
                tenant_id = %tenant,
                organization_id = %organization,
                collection = T::COLLECTION,
                "organization outside the caller's tenant"
            );
            return Err(DomainError::forbidden("organization is not part of the tenant"));
        }
        Ok(())
    }

    /// Rows that would collide with `doc` on any unique key in the same tenant.
    /// Keys with a missing or non-scalar field never collide.
    fn unique_conflict(tenant: Option<TenantId>, doc: &JsonValue, exclude: Option<EntityId>) -> Predicate {
        let mut collisions = Vec::new();
        for key in T::UNIQUE_KEYS {
            let mut filter = match tenant {
                Some(t) => Predicate::eq(fields::TENANT_ID, t.to_string()),
                None => Predicate::is_null(fields::TENANT_ID),
            };
            let mut complete = true;
            for field in key.iter() {
                match doc.get(*field).filter(|v| is_scalar(v)) {
                    Some(v) => filter = filter.and(Predicate::eq(*field, v.clone())),
                    None => complete = false,
                }
            }
            if !complete {
                continue;
            }
            if let Some(id) = exclude {
                filter = filter.and(Predicate::ne(fields::ID, id.to_string()));
            }
            collisions.push(filter);
        }
        Predicate::any(collisions)
    }

    fn uniqueness_error(err: StoreError) -> DomainError {
        match err {
            StoreError::Conflict(_) => {
                let keys = T::UNIQUE_KEYS
                    .iter()
                    .map(|key| key.join(", "))
                    .collect::<Vec<_>>()
                    .join(" or ");
                DomainError::conflict(format!("{} with the same {keys} already exists", T::COLLECTION))
            }
            other => other.into(),
        }
    }
}

fn is_scalar(v: &JsonValue) -> bool {
    matches!(v, JsonValue::Bool(_) | JsonValue::Number(_) | JsonValue::String(_))
}

fn as_object(doc: JsonValue) -> DomainResult<Map<String, JsonValue>> {
    match doc {
        JsonValue::Object(map) => Ok(map),
        _ => Err(DomainError::infrastructure("entity did not serialize to an object")),
    }
}

fn encode_error(e: serde_json::Error) -> DomainError {
    DomainError::infrastructure(format!("failed to encode entity: {e}"))
}

/// Shallow merge that skips protected and relation keys.
fn merge_writable<T: TenantScopedEntity>(doc: &mut Map<String, JsonValue>, input: Map<String, JsonValue>) {
    for (key, value) in input {
        if fields::PROTECTED.contains(&key.as_str())
            || key == fields::UPDATED_AT
            || T::relation(&key).is_some()
        {
            continue;
        }
        doc.insert(key, value);
    }
}

/// Keep only `select` paths (plus `id` and loaded relations).
fn project(doc: &JsonValue, select: &[String], relations: &[String]) -> JsonValue {
    let mut out = JsonValue::Object(Map::new());
    let keep = select
        .iter()
        .map(String::as_str)
        .chain(relations.iter().map(String::as_str))
        .chain(std::iter::once(fields::ID));
    for path in keep {
        if let Some(value) = lookup(doc, path) {
            insert_path(&mut out, path, value.clone());
        }
    }
    out
}

fn insert_path(target: &mut JsonValue, path: &str, value: JsonValue) {
    let mut cur = target;
    let mut segments = path.split('.').peekable();
    while let Some(seg) = segments.next() {
        let JsonValue::Object(map) = cur else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(seg.to_string(), value);
            return;
        }
        cur = map
            .entry(seg.to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()));
    }
}
