//! Authentication for terminal users
//!
//! Users log in with a username and password from the credential file.
//! The store is loaded once at startup and never modified afterwards.

mod credentials;

pub use credentials::{Credential, CredentialError, CredentialStore};
