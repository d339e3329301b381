//! tg-protocol: TN3270 terminal protocol for tn3270-gateway
//!
//! This crate switches client connections between telnet line mode and
//! 3270 block mode, and renders/collects structured screens. The gateway
//! uses it only through the [`TerminalProtocol`] trait.

pub mod adapter;
pub mod codec;
pub mod ebcdic;
pub mod error;
pub mod negotiation;
pub mod screen;
pub mod telnet;

pub use adapter::{ScreenRequest, ScreenResponse, TerminalProtocol, Tn3270};
pub use codec::TelnetCodec;
pub use error::ProtocolError;
pub use screen::{Aid, Color, Field, Highlight, Rules, Screen, Validator, COLS, ROWS};
pub use telnet::{TelnetEvent, Verb};
