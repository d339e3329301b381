//! Telnet command bytes and option codes used by TN3270
//!
//! Only the subset needed to switch a connection between NVT line mode and
//! 3270 block mode is defined here (RFC 854, RFC 885, RFC 1091, RFC 856).

/// Interpret As Command
pub const IAC: u8 = 255;
/// Refuse to perform an option
pub const DONT: u8 = 254;
/// Request the peer perform an option
pub const DO: u8 = 253;
/// Refuse to perform an option ourselves
pub const WONT: u8 = 252;
/// Agree to perform an option
pub const WILL: u8 = 251;
/// Subnegotiation begin
pub const SB: u8 = 250;
/// Subnegotiation end
pub const SE: u8 = 240;
/// End of record marker
pub const EOR: u8 = 239;

/// Option: binary transmission
pub const OPT_BINARY: u8 = 0;
/// Option: end of record
pub const OPT_EOR: u8 = 25;
/// Option: terminal type
pub const OPT_TERMINAL_TYPE: u8 = 24;

/// Terminal-type subnegotiation: the value follows
pub const TTYPE_IS: u8 = 0;
/// Terminal-type subnegotiation: please send your value
pub const TTYPE_SEND: u8 = 1;

/// Maximum size of a single data record (one screen's worth of input is far smaller)
pub const MAX_RECORD_SIZE: usize = 64 * 1024;

/// Option negotiation verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Will,
    Wont,
    Do,
    Dont,
}

impl Verb {
    /// Decode a verb from its command byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            WILL => Some(Verb::Will),
            WONT => Some(Verb::Wont),
            DO => Some(Verb::Do),
            DONT => Some(Verb::Dont),
            _ => None,
        }
    }

    /// Command byte for this verb
    pub fn as_u8(self) -> u8 {
        match self {
            Verb::Will => WILL,
            Verb::Wont => WONT,
            Verb::Do => DO,
            Verb::Dont => DONT,
        }
    }

    /// The refusal that answers an unsolicited request with this verb
    pub fn refusal(self) -> Option<Self> {
        match self {
            Verb::Will => Some(Verb::Dont),
            Verb::Do => Some(Verb::Wont),
            Verb::Wont | Verb::Dont => None,
        }
    }
}

/// One unit of the telnet stream, in either direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetEvent {
    /// `IAC <verb> <option>`
    Negotiate { verb: Verb, option: u8 },
    /// `IAC SB <payload> IAC SE`, payload unescaped
    Subnegotiate(bytes::Bytes),
    /// Data terminated by `IAC EOR`, unescaped
    Record(bytes::Bytes),
}

impl TelnetEvent {
    /// Shorthand for a negotiation command
    pub fn negotiate(verb: Verb, option: u8) -> Self {
        TelnetEvent::Negotiate { verb, option }
    }
}
