//! Mutations, their handlers, and the notifications they publish.

pub mod bus;
pub mod envelope;
pub mod handler;
pub mod in_memory_bus;
pub mod mutation;
pub mod tenant;

pub use bus::{NotificationBus, Subscription};
pub use envelope::NotificationEnvelope;
pub use handler::{DispatchError, MutationHandler};
pub use in_memory_bus::InMemoryNotificationBus;
pub use mutation::Mutation;
pub use tenant::TenantScoped;
