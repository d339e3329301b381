//! Gateway configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};
use crate::error::ConfigError;
use crate::types::{ListenerEndpoint, ListenerKind, TlsMaterial, TlsVersion};

/// Configuration for the gateway daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Plaintext listener port
    pub port: u16,

    /// Address both listeners bind to
    pub bind_address: String,

    /// Default host catalog (JSON)
    pub host_file: PathBuf,

    /// Credential file
    pub users_file: PathBuf,

    pub tls: TlsConfig,

    pub session: SessionConfig,

    pub relay: RelayConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 3270,
            bind_address: "0.0.0.0".to_string(),
            host_file: PathBuf::from("hosts.json"),
            users_file: PathBuf::from("users.cnf"),
            tls: TlsConfig::default(),
            session: SessionConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// The plaintext endpoint
    pub fn plaintext_endpoint(&self) -> ListenerEndpoint {
        ListenerEndpoint {
            kind: ListenerKind::Plaintext,
            bind_address: self.bind_address.clone(),
            port: self.port,
            handshake_timeout: self.session.handshake_timeout,
            tls: None,
        }
    }

    /// The encrypted endpoint, if TLS is enabled and fully configured
    pub fn tls_endpoint(&self) -> Option<ListenerEndpoint> {
        if !self.tls.enabled || !self.tls.missing_settings().is_empty() {
            return None;
        }
        let (Some(cert_path), Some(key_path)) = (&self.tls.cert_path, &self.tls.key_path) else {
            return None;
        };
        Some(ListenerEndpoint {
            kind: ListenerKind::Encrypted,
            bind_address: self.bind_address.clone(),
            port: self.tls.port,
            handshake_timeout: self.tls.handshake_timeout,
            tls: Some(TlsMaterial {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
                min_version: TlsVersion::parse(&self.tls.min_version)?,
                max_version: TlsVersion::parse(&self.tls.max_version)?,
            }),
        })
    }
}

/// Longest accepted value for any configured timeout
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Largest accepted relay buffer
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

fn check_timeout(name: &str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() || value > MAX_TIMEOUT {
        return Err(ConfigError::Invalid(format!(
            "{} must be between 1ms and {:?}, got {:?}",
            name, MAX_TIMEOUT, value
        )));
    }
    Ok(())
}

impl GatewayConfig {
    /// Reject timings and sizes the session and relay engines cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_timeout("tls.handshake_timeout", self.tls.handshake_timeout)?;
        check_timeout("session.handshake_timeout", self.session.handshake_timeout)?;
        check_timeout("session.idle_timeout", self.session.idle_timeout)?;

        let relay = &self.relay;
        check_timeout("relay.connect_timeout", relay.connect_timeout)?;
        check_timeout("relay.unnegotiate_timeout", relay.unnegotiate_timeout)?;
        check_timeout("relay.poll_interval", relay.poll_interval)?;
        check_timeout("relay.write_timeout", relay.write_timeout)?;
        check_timeout("relay.renegotiate_timeout", relay.renegotiate_timeout)?;
        if relay.settle_delay > MAX_TIMEOUT {
            return Err(ConfigError::Invalid(format!(
                "relay.settle_delay must be at most {:?}",
                MAX_TIMEOUT
            )));
        }
        if relay.renegotiate_backoff > MAX_TIMEOUT {
            return Err(ConfigError::Invalid(format!(
                "relay.renegotiate_backoff must be at most {:?}",
                MAX_TIMEOUT
            )));
        }
        if relay.buffer_size == 0 || relay.buffer_size > MAX_BUFFER_SIZE {
            return Err(ConfigError::Invalid(format!(
                "relay.buffer_size must be between 1 and {}, got {}",
                MAX_BUFFER_SIZE, relay.buffer_size
            )));
        }
        Ok(())
    }
}

/// Encrypted listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,

    /// Encrypted listener port; 0 means unset
    pub port: u16,

    /// PEM certificate chain
    pub cert_path: Option<PathBuf>,

    /// PEM private key
    pub key_path: Option<PathBuf>,

    pub min_version: String,

    pub max_version: String,

    /// Budget for the TLS handshake plus terminal negotiation
    #[serde(with = "duration_secs")]
    pub handshake_timeout: Duration,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 3271,
            cert_path: None,
            key_path: None,
            min_version: "1.2".to_string(),
            max_version: "1.3".to_string(),
            handshake_timeout: Duration::from_secs(60),
        }
    }
}

impl TlsConfig {
    /// Names of settings that keep the encrypted listener from starting
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.port == 0 {
            missing.push("port");
        }
        if self.cert_path.is_none() {
            missing.push("cert_path");
        }
        if self.key_path.is_none() {
            missing.push("key_path");
        }
        if TlsVersion::parse(&self.min_version).is_none() {
            missing.push("min_version");
        }
        if TlsVersion::parse(&self.max_version).is_none() {
            missing.push("max_version");
        }
        missing
    }
}

/// Per-connection session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Plaintext terminal negotiation budget
    #[serde(with = "duration_secs")]
    pub handshake_timeout: Duration,

    /// Longest wait for the user on any screen
    #[serde(with = "duration_secs")]
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Relay engine timings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Drain window when returning the client to line mode
    #[serde(with = "duration_secs")]
    pub unnegotiate_timeout: Duration,

    /// Read deadline renewed by each transfer direction
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,

    #[serde(with = "duration_secs")]
    pub write_timeout: Duration,

    /// Pause between the client reset and renegotiation
    #[serde(with = "duration_millis")]
    pub settle_delay: Duration,

    pub renegotiate_attempts: u32,

    #[serde(with = "duration_secs")]
    pub renegotiate_timeout: Duration,

    #[serde(with = "duration_secs")]
    pub renegotiate_backoff: Duration,

    /// Transfer buffer per direction, in bytes
    pub buffer_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            unnegotiate_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(200),
            write_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_millis(500),
            renegotiate_attempts: 3,
            renegotiate_timeout: Duration::from_secs(10),
            renegotiate_backoff: Duration::from_secs(1),
            buffer_size: 32 * 1024,
        }
    }
}
