//! ASCII <-> EBCDIC (code page 037) translation for printable characters

/// Printable ASCII paired with its CP037 code point
const PAIRS: [(u8, u8); 95] = [
    (b' ', 0x40), (b'!', 0x5A), (b'"', 0x7F), (b'#', 0x7B), (b'$', 0x5B),
    (b'%', 0x6C), (b'&', 0x50), (b'\'', 0x7D), (b'(', 0x4D), (b')', 0x5D),
    (b'*', 0x5C), (b'+', 0x4E), (b',', 0x6B), (b'-', 0x60), (b'.', 0x4B),
    (b'/', 0x61), (b'0', 0xF0), (b'1', 0xF1), (b'2', 0xF2), (b'3', 0xF3),
    (b'4', 0xF4), (b'5', 0xF5), (b'6', 0xF6), (b'7', 0xF7), (b'8', 0xF8),
    (b'9', 0xF9), (b':', 0x7A), (b';', 0x5E), (b'<', 0x4C), (b'=', 0x7E),
    (b'>', 0x6E), (b'?', 0x6F), (b'@', 0x7C), (b'A', 0xC1), (b'B', 0xC2),
    (b'C', 0xC3), (b'D', 0xC4), (b'E', 0xC5), (b'F', 0xC6), (b'G', 0xC7),
    (b'H', 0xC8), (b'I', 0xC9), (b'J', 0xD1), (b'K', 0xD2), (b'L', 0xD3),
    (b'M', 0xD4), (b'N', 0xD5), (b'O', 0xD6), (b'P', 0xD7), (b'Q', 0xD8),
    (b'R', 0xD9), (b'S', 0xE2), (b'T', 0xE3), (b'U', 0xE4), (b'V', 0xE5),
    (b'W', 0xE6), (b'X', 0xE7), (b'Y', 0xE8), (b'Z', 0xE9), (b'[', 0xBA),
    (b'\\', 0xE0), (b']', 0xBB), (b'^', 0xB0), (b'_', 0x6D), (b'`', 0x79),
    (b'a', 0x81), (b'b', 0x82), (b'c', 0x83), (b'd', 0x84), (b'e', 0x85),
    (b'f', 0x86), (b'g', 0x87), (b'h', 0x88), (b'i', 0x89), (b'j', 0x91),
    (b'k', 0x92), (b'l', 0x93), (b'm', 0x94), (b'n', 0x95), (b'o', 0x96),
    (b'p', 0x97), (b'q', 0x98), (b'r', 0x99), (b's', 0xA2), (b't', 0xA3),
    (b'u', 0xA4), (b'v', 0xA5), (b'w', 0xA6), (b'x', 0xA7), (b'y', 0xA8),
    (b'z', 0xA9), (b'{', 0xC0), (b'|', 0x4F), (b'}', 0xD0), (b'~', 0xA1),
];

/// EBCDIC question mark, used for anything without a mapping
const EBCDIC_SUBSTITUTE: u8 = 0x6F;

const fn build_to_ebcdic() -> [u8; 256] {
    let mut table = [EBCDIC_SUBSTITUTE; 256];
    let mut i = 0;
    while i < PAIRS.len() {
        table[PAIRS[i].0 as usize] = PAIRS[i].1;
        i += 1;
    }
    table
}

const fn build_to_ascii() -> [u8; 256] {
    // 0 marks "no printable mapping"
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < PAIRS.len() {
        table[PAIRS[i].1 as usize] = PAIRS[i].0;
        i += 1;
    }
    table
}

static TO_EBCDIC: [u8; 256] = build_to_ebcdic();
static TO_ASCII: [u8; 256] = build_to_ascii();

/// Convert a string to EBCDIC; characters outside printable ASCII become `?`
pub fn to_ebcdic(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| {
            if c.is_ascii() {
                TO_EBCDIC[c as usize]
            } else {
                EBCDIC_SUBSTITUTE
            }
        })
        .collect()
}

/// Convert EBCDIC field data to a string.
///
/// Nulls (unfilled field positions) are dropped, other unmapped bytes are skipped.
pub fn to_ascii(data: &[u8]) -> String {
    data.iter()
        .filter_map(|&b| match TO_ASCII[b as usize] {
            0 => None,
            c => Some(c as char),
        })
        .collect()
}
