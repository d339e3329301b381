//! 3270 screen description and data stream encoding
//!
//! A [`Screen`] is a list of [`Field`]s positioned on a 24x80 (model 2)
//! buffer. Outbound screens are sent as a single Erase/Write command;
//! inbound records carry the attention identifier followed by the
//! modified fields, each introduced by a set-buffer-address order.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};

use crate::ebcdic;
use crate::error::ProtocolError;

/// Screen rows (model 2)
pub const ROWS: usize = 24;
/// Screen columns (model 2)
pub const COLS: usize = 80;

const CMD_ERASE_WRITE: u8 = 0xF5;
/// Reset, keyboard restore, reset modified data tags
const WCC_DEFAULT: u8 = 0xC3;

const ORDER_SF: u8 = 0x1D;
const ORDER_SFE: u8 = 0x29;
const ORDER_SBA: u8 = 0x11;
const ORDER_IC: u8 = 0x13;

const XA_BASIC: u8 = 0xC0;
const XA_HIGHLIGHT: u8 = 0x41;
const XA_COLOR: u8 = 0x42;

const ATTR_PROTECTED: u8 = 0x20;
const ATTR_NUMERIC: u8 = 0x10;
const ATTR_INTENSE: u8 = 0x08;
const ATTR_HIDDEN: u8 = 0x0C;

/// 6-bit values as they appear in buffer addresses and field attributes
const CODES: [u8; 64] = [
    0x40, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0x4A, 0x4B, 0x4C, 0x4D, 0x4E,
    0x4F, 0x50, 0xD1, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0x5A, 0x5B, 0x5C, 0x5D,
    0x5E, 0x5F, 0x60, 0x61, 0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0x6A, 0x6B, 0x6C,
    0x6D, 0x6E, 0x6F, 0xF0, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0x7A, 0x7B,
    0x7C, 0x7D, 0x7E, 0x7F,
];

/// Field foreground colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    Default,
    Blue,
    Red,
    Pink,
    Green,
    Turquoise,
    Yellow,
    White,
}

impl Color {
    fn code(self) -> u8 {
        match self {
            Color::Default => 0x00,
            Color::Blue => 0xF1,
            Color::Red => 0xF2,
            Color::Pink => 0xF3,
            Color::Green => 0xF4,
            Color::Turquoise => 0xF5,
            Color::Yellow => 0xF6,
            Color::White => 0xF7,
        }
    }
}

/// Field highlighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Highlight {
    #[default]
    Default,
    Blink,
    Reverse,
    Underscore,
}

impl Highlight {
    fn code(self) -> u8 {
        match self {
            Highlight::Default => 0x00,
            Highlight::Blink => 0xF1,
            Highlight::Reverse => 0xF2,
            Highlight::Underscore => 0xF4,
        }
    }
}

/// Attention identifier: the key that ended a screen wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aid {
    None,
    Enter,
    Clear,
    Pa(u8),
    Pf(u8),
}

impl Aid {
    /// Decode an AID byte. Unknown values yield `None`.
    pub fn from_u8(value: u8) -> Option<Self> {
        let aid = match value {
            0x60 => Aid::None,
            0x7D => Aid::Enter,
            0x6D => Aid::Clear,
            0x6C => Aid::Pa(1),
            0x6E => Aid::Pa(2),
            0x6B => Aid::Pa(3),
            0xF1..=0xF9 => Aid::Pf(value - 0xF0),
            0x7A..=0x7C => Aid::Pf(value - 0x7A + 10),
            0xC1..=0xC9 => Aid::Pf(value - 0xC1 + 13),
            0x4A..=0x4C => Aid::Pf(value - 0x4A + 22),
            _ => return None,
        };
        Some(aid)
    }

    /// Short reads (PA keys, Clear) carry no field data
    pub fn is_short_read(self) -> bool {
        matches!(self, Aid::Clear | Aid::Pa(_))
    }
}

/// One field on a screen.
///
/// A field's attribute byte occupies `(row, col)`; its content starts one
/// position to the right.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Field {
    pub row: usize,
    pub col: usize,
    /// Static text, or the initial value of a named input field
    pub content: String,
    /// Input fields are named; their values come back in the response
    pub name: Option<String>,
    /// Whether the user may type into the field
    pub write: bool,
    pub intense: bool,
    /// Input is not echoed
    pub hidden: bool,
    /// Protected skip field, stops the cursor after an input field
    pub autoskip: bool,
    pub color: Color,
    pub highlight: Highlight,
}

impl Field {
    /// Protected static text
    pub fn text(row: usize, col: usize, content: impl Into<String>) -> Self {
        Self {
            row,
            col,
            content: content.into(),
            ..Default::default()
        }
    }

    /// Named, unprotected input field
    pub fn input(row: usize, col: usize, name: impl Into<String>) -> Self {
        Self {
            row,
            col,
            name: Some(name.into()),
            write: true,
            ..Default::default()
        }
    }

    /// Named, protected output field whose content is supplied through values
    pub fn output(row: usize, col: usize, name: impl Into<String>) -> Self {
        Self {
            row,
            col,
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Skip field terminating the preceding input field
    pub fn stop(row: usize, col: usize) -> Self {
        Self {
            row,
            col,
            autoskip: true,
            ..Default::default()
        }
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn highlight(mut self, highlight: Highlight) -> Self {
        self.highlight = highlight;
        self
    }

    pub fn intense(mut self) -> Self {
        self.intense = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    fn address(&self) -> usize {
        self.row * COLS + self.col
    }

    fn attribute(&self) -> u8 {
        let mut attr = 0;
        if !self.write {
            attr |= ATTR_PROTECTED;
        }
        if self.autoskip {
            attr |= ATTR_PROTECTED | ATTR_NUMERIC;
        }
        if self.hidden {
            attr |= ATTR_HIDDEN;
        } else if self.intense {
            attr |= ATTR_INTENSE;
        }
        CODES[(attr & 0x3F) as usize]
    }
}

/// A full screen layout
pub type Screen = Vec<Field>;

/// Validation applied to a named input field before the screen is accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    /// At least one non-space character
    NonBlank,
    /// Parses as an integer after trimming
    IsInteger,
}

impl Validator {
    pub fn check(self, value: &str) -> bool {
        match self {
            Validator::NonBlank => !value.trim().is_empty(),
            Validator::IsInteger => value.trim().parse::<i64>().is_ok(),
        }
    }

    /// Message shown in the screen's error field when `field` fails
    pub fn message(self, field: &str) -> String {
        match self {
            Validator::NonBlank => format!("Please enter a value for {}.", field.to_uppercase()),
            Validator::IsInteger => format!("{} must be a number.", field.to_uppercase()),
        }
    }
}

/// Field name -> validator
pub type Rules = HashMap<String, Validator>;

fn put_address(dst: &mut BytesMut, address: usize) {
    dst.put_u8(CODES[(address >> 6) & 0x3F]);
    dst.put_u8(CODES[address & 0x3F]);
}

fn decode_address(hi: u8, lo: u8) -> usize {
    if hi & 0xC0 == 0 {
        // 14-bit addressing
        (((hi & 0x3F) as usize) << 8) | lo as usize
    } else {
        (((hi & 0x3F) as usize) << 6) | (lo & 0x3F) as usize
    }
}

/// Encode a screen as an Erase/Write data stream (without telnet framing).
///
/// Named fields display `values[name]` when present, else their static content.
pub fn encode_screen(
    screen: &[Field],
    values: &HashMap<String, String>,
    cursor: (usize, usize),
) -> BytesMut {
    let mut dst = BytesMut::with_capacity(ROWS * COLS);
    dst.put_u8(CMD_ERASE_WRITE);
    dst.put_u8(WCC_DEFAULT);

    for field in screen {
        if field.row >= ROWS || field.col >= COLS {
            tracing::debug!("Skipping field outside screen at {},{}", field.row, field.col);
            continue;
        }

        dst.put_u8(ORDER_SBA);
        put_address(&mut dst, field.address());

        if field.color == Color::Default && field.highlight == Highlight::Default {
            dst.put_u8(ORDER_SF);
            dst.put_u8(field.attribute());
        } else {
            let mut pairs = vec![(XA_BASIC, field.attribute())];
            if field.highlight != Highlight::Default {
                pairs.push((XA_HIGHLIGHT, field.highlight.code()));
            }
            if field.color != Color::Default {
                pairs.push((XA_COLOR, field.color.code()));
            }
            dst.put_u8(ORDER_SFE);
            dst.put_u8(pairs.len() as u8);
            for (kind, value) in pairs {
                dst.put_u8(kind);
                dst.put_u8(value);
            }
        }

        let content = field
            .name
            .as_ref()
            .and_then(|name| values.get(name))
            .unwrap_or(&field.content);
        if !content.is_empty() {
            dst.extend_from_slice(&ebcdic::to_ebcdic(content));
        }
    }

    let (row, col) = cursor;
    dst.put_u8(ORDER_SBA);
    put_address(&mut dst, (row.min(ROWS - 1)) * COLS + col.min(COLS - 1));
    dst.put_u8(ORDER_IC);

    dst
}

/// Decode an inbound record into its AID and the modified named fields.
pub fn decode_response(
    record: &[u8],
    screen: &[Field],
) -> Result<(Aid, HashMap<String, String>), ProtocolError> {
    let first = *record
        .first()
        .ok_or_else(|| ProtocolError::Malformed("empty record".into()))?;
    let aid = Aid::from_u8(first)
        .ok_or_else(|| ProtocolError::Malformed(format!("unknown AID 0x{:02X}", first)))?;

    let mut modified = HashMap::new();
    if aid.is_short_read() || record.len() < 3 {
        return Ok((aid, modified));
    }

    // Data address of each named field -> name
    let by_address: HashMap<usize, &str> = screen
        .iter()
        .filter_map(|f| f.name.as_deref().map(|n| ((f.address() + 1) % (ROWS * COLS), n)))
        .collect();

    // Skip AID and cursor address
    let mut rest = &record[3..];
    while let Some(&order) = rest.first() {
        if order != ORDER_SBA || rest.len() < 3 {
            return Err(ProtocolError::Malformed(format!(
                "expected set-buffer-address, found 0x{:02X}",
                order
            )));
        }
        let address = decode_address(rest[1], rest[2]);
        rest = &rest[3..];
        let end = rest.iter().position(|&b| b == ORDER_SBA).unwrap_or(rest.len());
        let (data, tail) = rest.split_at(end);
        rest = tail;

        match by_address.get(&address) {
            Some(name) => {
                modified.insert(name.to_string(), ebcdic::to_ascii(data));
            }
            None => tracing::trace!("Ignoring data for unnamed address {}", address),
        }
    }

    Ok((aid, modified))
}
