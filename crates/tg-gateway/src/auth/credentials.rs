//! Credential file loading and lookup

use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Field separator in the credential file
const DELIMITER: char = '/';

/// Errors loading the credential file
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to open credential file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read line {line} of {path}: {source}")]
    Read {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("No valid credentials found in {0}")]
    Empty(PathBuf),
}

/// One user allowed to log in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
    /// Per-user host catalog file, if the user has one
    pub catalog_ref: Option<PathBuf>,
}

/// Immutable set of credentials, in file order
#[derive(Debug, Default)]
pub struct CredentialStore {
    records: Vec<Credential>,
}

impl CredentialStore {
    /// Build a store from records already in lookup order
    pub fn new(records: Vec<Credential>) -> Self {
        Self { records }
    }

    /// Load the credential file; fails if it yields no valid records
    pub fn load_from_file(path: &Path) -> Result<Self, CredentialError> {
        tracing::info!("Loading credentials from {:?}", path);

        let file = std::fs::File::open(path).map_err(|source| CredentialError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut seen = HashSet::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| CredentialError::Read {
                path: path.to_path_buf(),
                line: line_num + 1,
                source,
            })?;
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match parse_line(line) {
                Some(credential) => {
                    if !seen.insert(credential.username.clone()) {
                        tracing::warn!(
                            "Duplicate user {:?} on line {} of {:?}; the first entry wins",
                            credential.username,
                            line_num + 1,
                            path
                        );
                    }
                    records.push(credential);
                }
                None => {
                    tracing::warn!("Skipping malformed credential on line {} of {:?}", line_num + 1, path);
                }
            }
        }

        if records.is_empty() {
            return Err(CredentialError::Empty(path.to_path_buf()));
        }

        tracing::info!("Loaded {} credentials from {:?}", records.len(), path);
        Ok(Self { records })
    }

    /// First record matching both username and password, in file order
    pub fn authenticate(&self, username: &str, password: &str) -> Option<&Credential> {
        self.records
            .iter()
            .find(|c| c.username == username && c.password == password)
    }

    /// Get the number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if there are no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parse `username/password[/host-file]`
fn parse_line(line: &str) -> Option<Credential> {
    let mut parts = line.splitn(3, DELIMITER).map(str::trim);
    let username = parts.next().filter(|s| !s.is_empty())?;
    let password = parts.next().filter(|s| !s.is_empty())?;
    let catalog_ref = parts.next().filter(|s| !s.is_empty()).map(PathBuf::from);

    Some(Credential {
        username: username.to_string(),
        password: password.to_string(),
        catalog_ref,
    })
}
