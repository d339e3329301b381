//! Terminal sessions
//!
//! Each accepted connection runs one [`Session`]: terminal negotiation,
//! login, then the host menu. Choosing a host hands the connection to the
//! relay until the backend goes away, after which the menu is shown again.

mod handler;
pub mod relay;
pub mod screens;

pub use handler::{resolve_catalog, AuthenticatedSession, Session, SessionError};
pub use relay::{relay, Direction, RelayOutcome};
pub use screens::{parse_selection, MenuChoice};
