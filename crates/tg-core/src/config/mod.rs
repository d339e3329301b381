//! Configuration management for tn3270-gateway

mod catalog;
mod gateway;
pub mod serde_utils;

pub use catalog::load_host_catalog;
pub use gateway::{
    GatewayConfig, RelayConfig, SessionConfig, TlsConfig, MAX_BUFFER_SIZE, MAX_TIMEOUT,
};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    PathBuf::from("gateway.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}
