//! HTTP API: context middleware, route guards and error mapping.

pub mod app;
pub mod authz;
pub mod config;
pub mod middleware;

pub use config::{ApiConfig, StartupError};
