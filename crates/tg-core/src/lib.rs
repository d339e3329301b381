//! tg-core: Core types and configuration for tn3270-gateway
//!
//! This crate provides the host catalog, listener endpoint descriptions and
//! configuration structures shared by the gateway binary and its tests.

pub mod config;
pub mod error;
pub mod types;

pub use config::{load_host_catalog, GatewayConfig};
pub use error::{CatalogError, ConfigError};
pub use types::{Host, HostCatalog, ListenerEndpoint, ListenerKind, TlsMaterial, TlsVersion};
