//! Protocol error types

use thiserror::Error;

/// Errors that can occur while talking TN3270 to a client
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The client refused an option the gateway requires
    #[error("Client refused telnet option {0}")]
    OptionRefused(u8),

    /// The client closed the connection
    #[error("Connection closed by client")]
    ConnectionClosed,

    /// Record exceeds maximum size
    #[error("Record too large: {size} bytes exceeds maximum of {max} bytes")]
    RecordTooLarge { size: usize, max: usize },

    /// The client sent an inbound record that could not be decoded
    #[error("Malformed inbound record: {0}")]
    Malformed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
