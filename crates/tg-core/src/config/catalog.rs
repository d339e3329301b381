//! Host catalog files

use std::path::Path;

use crate::error::CatalogError;
use crate::types::HostCatalog;

/// Load an ordered host list from a JSON file of `{name, host, port}` records
pub fn load_host_catalog(path: &Path) -> Result<HostCatalog, CatalogError> {
    let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let catalog: HostCatalog =
        serde_json::from_str(&content).map_err(|source| CatalogError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::debug!("Loaded {} hosts from {}", catalog.len(), path.display());
    Ok(catalog)
}
