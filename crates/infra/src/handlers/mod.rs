//! Mutation handlers for the built-in tenancy records.

pub mod create_tenant;
pub mod role_permissions;

pub use create_tenant::{CreateTenant, CreateTenantHandler};
pub use role_permissions::{
    CreateRolePermission, DeleteRolePermission, FindMyPermissions, FindRolePermissions,
    GrantQueryHandler, RolePermissionHandler, UpdateRolePermission,
};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use serde_json::Value as JsonValue;

    use worklane_auth::{
        CredentialClaims, Hs256CredentialDecoder, IdentityContext, IdentityResolver, Principal,
        RequestMetadata, RoleGrants, RoleStore,
    };
    use worklane_core::{EntityId, Predicate, StorageQuery, UserId};

    use crate::role_store::StoreRoleStore;
    use crate::storage::{InMemoryStore, StoragePort, StoreError};

    pub const SECRET: &[u8] = b"handler-tests";

    /// In-memory store that fails inserts or deletes for one collection.
    pub struct FlakyStore {
        inner: InMemoryStore,
        fail_insert: Option<&'static str>,
        fail_delete: Option<&'static str>,
    }

    impl FlakyStore {
        pub fn new(fail_insert: Option<&'static str>, fail_delete: Option<&'static str>) -> Self {
            Self {
                inner: InMemoryStore::new(),
                fail_insert,
                fail_delete,
            }
        }
    }

    #[async_trait]
    impl StoragePort for FlakyStore {
        fn backend(&self) -> &'static str {
            "flaky"
        }

        async fn count(&self, collection: &str, filter: &Predicate) -> Result<u64, StoreError> {
            self.inner.count(collection, filter).await
        }

        async fn find(
            &self,
            collection: &str,
            query: &StorageQuery,
        ) -> Result<Vec<JsonValue>, StoreError> {
            self.inner.find(collection, query).await
        }

        async fn insert(&self, collection: &str, doc: JsonValue) -> Result<(), StoreError> {
            if self.fail_insert == Some(collection) {
                return Err(StoreError::Backend(format!("{collection} unavailable")));
            }
            self.inner.insert(collection, doc).await
        }

        async fn replace(&self, collection: &str, doc: JsonValue) -> Result<bool, StoreError> {
            self.inner.replace(collection, doc).await
        }

        async fn insert_unless(
            &self,
            collection: &str,
            doc: JsonValue,
            conflict: &Predicate,
        ) -> Result<(), StoreError> {
            if self.fail_insert == Some(collection) {
                return Err(StoreError::Backend(format!("{collection} unavailable")));
            }
            self.inner.insert_unless(collection, doc, conflict).await
        }

        async fn replace_if(
            &self,
            collection: &str,
            doc: JsonValue,
            guard: &Predicate,
            conflict: &Predicate,
        ) -> Result<bool, StoreError> {
            self.inner.replace_if(collection, doc, guard, conflict).await
        }

        async fn delete(&self, collection: &str, id: EntityId) -> Result<bool, StoreError> {
            if self.fail_delete == Some(collection) {
                return Err(StoreError::Backend(format!("{collection} unavailable")));
            }
            self.inner.delete(collection, id).await
        }
    }

    pub async fn principal(users: &StoreRoleStore, id: UserId) -> Principal {
        users.find_principal_by_id(id).await.unwrap().unwrap()
    }

    /// A request context authenticated as `principal`.
    pub fn context_for(users: &StoreRoleStore, principal: &Principal) -> IdentityContext {
        let now = Utc::now();
        let claims = CredentialClaims {
            sub: principal.id,
            tenant_id: principal.tenant_id,
            role_id: principal.role_id,
            role: principal.role_kind(),
            permissions: principal.role.as_ref().map(RoleGrants::enabled).unwrap_or_default(),
            issued_at: now - Duration::seconds(5),
            expires_at: now + Duration::minutes(5),
        };
        let decoder = Hs256CredentialDecoder::new(SECRET);
        let token = decoder.issue(&claims).unwrap();
        let resolver = IdentityResolver::new(Arc::new(decoder), Arc::new(users.clone()));
        IdentityContext::new(
            RequestMetadata {
                authorization: Some(format!("Bearer {token}")),
                ..Default::default()
            },
            Some(Arc::new(resolver)),
        )
    }
}
