//! The tenant-scoped record contract every persisted business record satisfies.

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::id::{EntityId, OrganizationId, TenantId};

/// Document field names shared by every tenant-scoped record.
pub mod fields {
    pub const ID: &str = "id";
    pub const TENANT_ID: &str = "tenant_id";
    pub const ORGANIZATION_ID: &str = "organization_id";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
    pub const DELETED_AT: &str = "deleted_at";
    pub const IS_ARCHIVED: &str = "is_archived";
    pub const IS_ACTIVE: &str = "is_active";

    /// Fields a caller can never overwrite through an update patch.
    pub const PROTECTED: &[&str] = &[ID, TENANT_ID, CREATED_AT, DELETED_AT, IS_ARCHIVED];
}

fn default_true() -> bool {
    true
}

/// Current time at the precision documents are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 timestamps (microseconds, `Z`).
///
/// Stored documents are ordered by comparing these as text, so every
/// timestamp must have the same width.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(at: &DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            at: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match at {
                Some(at) => super::serialize(at, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| {
                    DateTime::parse_from_rfc3339(&raw)
                        .map(|t| t.with_timezone(&Utc))
                        .map_err(serde::de::Error::custom)
                })
                .transpose()
        }
    }
}

/// Base shape of every persisted record.
///
/// Records embed this with `#[serde(flatten)]`, so the fields sit at the top
/// level of the stored document where predicates can address them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub id: EntityId,

    /// Owning tenant. `None` only for tenant-global defaults.
    #[serde(default)]
    pub tenant_id: Option<TenantId>,

    #[serde(default)]
    pub organization_id: Option<OrganizationId>,

    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,

    /// Soft-delete marker.
    #[serde(default, with = "timestamp::option")]
    pub deleted_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub is_archived: bool,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl EntityMeta {
    /// Fresh, unscoped metadata. Tenant and organization are stamped on create.
    pub fn new() -> Self {
        Self::with_id(EntityId::new())
    }

    pub fn with_id(id: EntityId) -> Self {
        let now = now();
        Self {
            id,
            tenant_id: None,
            organization_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            is_archived: false,
            is_active: true,
        }
    }

    pub fn is_soft_deleted(&self) -> bool {
        self.is_archived || self.deleted_at.is_some()
    }

    pub fn archive(&mut self, at: DateTime<Utc>) {
        self.is_archived = true;
        self.deleted_at = Some(at);
        self.updated_at = at;
    }

    pub fn restore(&mut self, at: DateTime<Utc>) {
        self.is_archived = false;
        self.deleted_at = None;
        self.updated_at = at;
    }
}

impl Default for EntityMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// A relation an entity may eagerly load.
///
/// The related rows are those in `collection` whose `foreign_field` equals this
/// record's `local_field`. They are embedded in the result document under `name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationDef {
    pub name: &'static str,
    pub collection: &'static str,
    pub local_field: &'static str,
    pub foreign_field: &'static str,
    /// `true` embeds an array, `false` embeds the first match (or null).
    pub many: bool,
}

/// Contract for records persisted through the generic data-access service.
///
/// # Invariants
/// - `tenant_id` equals the tenant of the context that created the row.
/// - `organization_id`, when present, names an organization of the same tenant.
/// - Relation names are never persisted; they are stripped before writes.
pub trait TenantScopedEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Storage collection (table) name.
    const COLLECTION: &'static str;

    /// Whether rows with `tenant_id = null` are visible to every tenant as
    /// read-only fallbacks.
    const SHARES_GLOBAL_DEFAULTS: bool = false;

    fn meta(&self) -> &EntityMeta;

    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Field sets that must be unique among a tenant's rows.
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[];

    fn relations() -> &'static [RelationDef] {
        &[]
    }

    fn id(&self) -> EntityId {
        self.meta().id
    }

    fn relation(name: &str) -> Option<&'static RelationDef> {
        Self::relations().iter().find(|r| r.name == name)
    }
}
