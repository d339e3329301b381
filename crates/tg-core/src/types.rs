//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// One backend target a user can be relayed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Display name shown on the menu
    pub name: String,
    /// Hostname or IP address
    #[serde(rename = "host")]
    pub address: String,
    pub port: u16,
}

impl Host {
    /// Create a new host
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
        }
    }

    /// `address:port`, suitable for connecting
    pub fn target(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.address, self.port)
    }
}

/// Ordered list of hosts; menu numbers are 1-based positions in this list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostCatalog {
    hosts: Vec<Host>,
}

impl HostCatalog {
    /// Create a catalog from hosts in menu order
    pub fn new(hosts: Vec<Host>) -> Self {
        Self { hosts }
    }

    /// Look up a host by its 1-based menu number
    pub fn select(&self, number: usize) -> Option<&Host> {
        number.checked_sub(1).and_then(|index| self.hosts.get(index))
    }

    /// Hosts in menu order
    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    /// Number of hosts
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Check if the catalog has no hosts
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Kind of listener endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListenerKind {
    /// Plain TCP
    Plaintext,
    /// TLS over TCP
    Encrypted,
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerKind::Plaintext => write!(f, "plaintext"),
            ListenerKind::Encrypted => write!(f, "tls"),
        }
    }
}

/// TLS protocol version as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl TlsVersion {
    /// Parse `"1.0"` .. `"1.3"`, with or without a `TLS` prefix
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let bare = value
            .strip_prefix("TLS")
            .or_else(|| value.strip_prefix("tls"))
            .unwrap_or(value)
            .trim_start_matches(['v', ' ']);
        match bare {
            "1.0" | "10" => Some(TlsVersion::Tls10),
            "1.1" | "11" => Some(TlsVersion::Tls11),
            "1.2" | "12" => Some(TlsVersion::Tls12),
            "1.3" | "13" => Some(TlsVersion::Tls13),
            _ => None,
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = match self {
            TlsVersion::Tls10 => "1.0",
            TlsVersion::Tls11 => "1.1",
            TlsVersion::Tls12 => "1.2",
            TlsVersion::Tls13 => "1.3",
        };
        write!(f, "TLS {}", version)
    }
}

/// Certificate material and protocol bounds for an encrypted endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub min_version: TlsVersion,
    pub max_version: TlsVersion,
}

/// One network endpoint the gateway keeps accepting on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerEndpoint {
    pub kind: ListenerKind,
    pub bind_address: String,
    pub port: u16,
    /// Budget for the transport handshake plus terminal negotiation
    pub handshake_timeout: Duration,
    /// Present exactly when `kind` is `Encrypted`
    pub tls: Option<TlsMaterial>,
}

impl ListenerEndpoint {
    /// `bind_address:port`
    pub fn bind_target(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl fmt::Display for ListenerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} listener on {}", self.kind, self.bind_target())
    }
}
