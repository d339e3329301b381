//! TLS acceptor construction for the encrypted listener

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ServerConfig, SupportedProtocolVersion};
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

use tg_core::{TlsMaterial, TlsVersion};

/// Errors building the TLS acceptor
#[derive(Error, Debug)]
pub enum TlsError {
    #[error("Failed to load certificate from {path}: {message}")]
    CertLoad { path: PathBuf, message: String },

    #[error("Failed to load private key from {path}: {message}")]
    KeyLoad { path: PathBuf, message: String },

    #[error("Minimum TLS version {min} is above maximum {max}")]
    VersionRange { min: TlsVersion, max: TlsVersion },

    #[error("Maximum TLS version {0} is not supported (1.2 or later required)")]
    Unsupported(TlsVersion),

    #[error("Invalid TLS configuration: {0}")]
    Config(String),
}

/// Oldest version the TLS stack implements
pub const MIN_SUPPORTED: TlsVersion = TlsVersion::Tls12;

/// The minimum version actually offered, if the configured one is raised
pub fn raised_minimum(material: &TlsMaterial) -> Option<TlsVersion> {
    (material.min_version < MIN_SUPPORTED).then_some(MIN_SUPPORTED)
}

/// Protocol versions to offer for a configured range.
///
/// A minimum below 1.2 is silently raised to 1.2; see [`raised_minimum`].
pub fn protocol_versions(
    min: TlsVersion,
    max: TlsVersion,
) -> Result<Vec<&'static SupportedProtocolVersion>, TlsError> {
    if min > max {
        return Err(TlsError::VersionRange { min, max });
    }
    if max < MIN_SUPPORTED {
        return Err(TlsError::Unsupported(max));
    }

    let mut versions = Vec::new();
    if max >= TlsVersion::Tls13 {
        versions.push(&rustls::version::TLS13);
    }
    if min <= TlsVersion::Tls12 {
        versions.push(&rustls::version::TLS12);
    }
    Ok(versions)
}

/// Load certificates and key from disk and build an acceptor
pub fn build_acceptor(material: &TlsMaterial) -> Result<TlsAcceptor, TlsError> {
    let versions = protocol_versions(material.min_version, material.max_version)?;

    let certs = load_certificates(&material.cert_path)?;
    if certs.is_empty() {
        return Err(TlsError::CertLoad {
            path: material.cert_path.clone(),
            message: "no certificates found in file".to_string(),
        });
    }
    let key = load_private_key(&material.key_path)?;

    let provider = rustls::crypto::ring::default_provider();
    let server_config = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&versions)
        .map_err(|e| TlsError::Config(format!("Failed to set protocol versions: {}", e)))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| TlsError::Config(format!("Failed to build TLS config: {}", e)))?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let cert_error = |message: String| TlsError::CertLoad {
        path: path.to_path_buf(),
        message,
    };

    let file = File::open(path).map_err(|e| cert_error(e.to_string()))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| cert_error(e.to_string()))
}

/// Reads PKCS#8, RSA or SEC1 keys
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let key_error = |message: String| TlsError::KeyLoad {
        path: path.to_path_buf(),
        message,
    };

    let file = File::open(path).map_err(|e| key_error(e.to_string()))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| key_error(e.to_string()))?
        .ok_or_else(|| key_error("no private key found in file".to_string()))
}
