//! tg-gateway: TN3270 gateway daemon
//!
//! The gateway accepts TN3270 clients on a plaintext and an optional TLS
//! listener, authenticates them against a credential file, and relays each
//! user to a backend host chosen from a menu. When the backend goes away the
//! user is returned to the menu.

pub mod auth;
pub mod server;
pub mod session;
pub mod state;

pub use state::GatewayState;
