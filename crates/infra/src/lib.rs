//! Infrastructure layer: storage adapters, tenant-scoped data access,
//! mutation dispatch and background workers.

pub mod config;
pub mod data_access;
pub mod dispatcher;
pub mod handlers;
pub mod role_store;
pub mod storage;
pub mod workers;

pub use config::{ConfigError, StorageBackend, StorageConfig};
pub use data_access::GenericDataAccessService;
pub use dispatcher::MutationDispatcher;
pub use role_store::StoreRoleStore;
pub use storage::{InMemoryStore, SqliteStore, StoragePort, StoreError};
pub use workers::{NotificationWorker, WorkerHandle};
