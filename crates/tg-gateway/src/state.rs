//! Process-wide gateway state

use std::sync::Arc;

use tg_core::config::GatewayConfig;
use tg_core::HostCatalog;
use tg_protocol::{TerminalProtocol, Tn3270};

use crate::auth::CredentialStore;

/// Read-only state shared by every listener and session
pub struct GatewayState<P = Tn3270> {
    /// Configuration
    pub config: GatewayConfig,
    /// Credentials
    pub credentials: Arc<CredentialStore>,
    /// Catalog for users without their own
    pub default_catalog: Arc<HostCatalog>,
    /// Terminal protocol spoken to clients
    pub protocol: P,
}

impl GatewayState<Tn3270> {
    /// Create gateway state speaking TN3270
    pub fn new(
        config: GatewayConfig,
        credentials: CredentialStore,
        default_catalog: HostCatalog,
    ) -> Self {
        Self::with_protocol(config, credentials, default_catalog, Tn3270::new())
    }
}

impl<P: TerminalProtocol> GatewayState<P> {
    /// Create gateway state with a specific protocol implementation
    pub fn with_protocol(
        config: GatewayConfig,
        credentials: CredentialStore,
        default_catalog: HostCatalog,
        protocol: P,
    ) -> Self {
        Self {
            config,
            credentials: Arc::new(credentials),
            default_catalog: Arc::new(default_catalog),
            protocol,
        }
    }
}
