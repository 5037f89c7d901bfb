//! `worklane-tenancy`: built-in tenant-scoped records.
//!
//! Tenants, their organizations, the role set and its permission grants,
//! tenant settings and users. All are plain serde documents implementing
//! [`TenantScopedEntity`](worklane_core::TenantScopedEntity).

pub mod notification;
pub mod organization;
pub mod role;
pub mod setting;
pub mod tenant;
pub mod user;

pub use notification::TenancyNotification;
pub use organization::Organization;
pub use role::{DEFAULT_ROLE_PERMISSIONS, Role, RolePermission, default_permissions};
pub use setting::{DEFAULT_TENANT_SETTINGS, SettingKey, TenantSetting};
pub use tenant::Tenant;
pub use user::UserRecord;
