//! EBCDIC code-page conversion
//!
//! Byte-for-byte conversion between EBCDIC and Unicode through 256-entry
//! tables. Code page 037 (US/Canada) is the default; 1047 (Latin-1/Open
//! Systems) is available for hosts that negotiate it. The reverse tables
//! are derived from the forward tables on first use.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// EBCDIC to Unicode translation table for code page 037
///
/// Maps all 256 EBCDIC code points; the first four rows are control
/// characters carried through to their C0/C1 equivalents.
const CP037_TO_CHAR: [char; 256] = [
    // 0x00-0x0F
    '\x00', '\x01', '\x02', '\x03', '\u{009C}', '\t', '\u{0086}', '\x7F',
    '\u{0097}', '\u{008D}', '\u{008E}', '\x0B', '\x0C', '\r', '\x0E', '\x0F',
    // 0x10-0x1F
    '\x10', '\x11', '\x12', '\x13', '\u{009D}', '\u{0085}', '\x08', '\u{0087}',
    '\x18', '\x19', '\u{0092}', '\u{008F}', '\x1C', '\x1D', '\x1E', '\x1F',
    // 0x20-0x2F
    '\u{0080}', '\u{0081}', '\u{0082}', '\u{0083}', '\u{0084}', '\n', '\x17', '\x1B',
    '\u{0088}', '\u{0089}', '\u{008A}', '\u{008B}', '\u{008C}', '\x05', '\x06', '\x07',
    // 0x30-0x3F
    '\u{0090}', '\u{0091}', '\x16', '\u{0093}', '\u{0094}', '\u{0095}', '\u{0096}', '\x04',
    '\u{0098}', '\u{0099}', '\u{009A}', '\u{009B}', '\x14', '\x15', '\u{009E}', '\x1A',
    // 0x40-0x4F
    ' ', '\u{00A0}', '\u{00E2}', '\u{00E4}', '\u{00E0}', '\u{00E1}', '\u{00E3}', '\u{00E5}',
    '\u{00E7}', '\u{00F1}', '\u{00A2}', '.', '<', '(', '+', '|',
    // 0x50-0x5F
    '&', '\u{00E9}', '\u{00EA}', '\u{00EB}', '\u{00E8}', '\u{00ED}', '\u{00EE}', '\u{00EF}',
    '\u{00EC}', '\u{00DF}', '!', '$', '*', ')', ';', '\u{00AC}',
    // 0x60-0x6F
    '-', '/', '\u{00C2}', '\u{00C4}', '\u{00C0}', '\u{00C1}', '\u{00C3}', '\u{00C5}',
    '\u{00C7}', '\u{00D1}', '\u{00A6}', ',', '%', '_', '>', '?',
    // 0x70-0x7F
    '\u{00F8}', '\u{00C9}', '\u{00CA}', '\u{00CB}', '\u{00C8}', '\u{00CD}', '\u{00CE}', '\u{00CF}',
    '\u{00CC}', '`', ':', '#', '@', '\'', '=', '"',
    // 0x80-0x8F
    '\u{00D8}', 'a', 'b', 'c', 'd', 'e', 'f', 'g',
    'h', 'i', '\u{00AB}', '\u{00BB}', '\u{00F0}', '\u{00FD}', '\u{00FE}', '\u{00B1}',
    // 0x90-0x9F
    '\u{00B0}', 'j', 'k', 'l', 'm', 'n', 'o', 'p',
    'q', 'r', '\u{00AA}', '\u{00BA}', '\u{00E6}', '\u{00B8}', '\u{00C6}', '\u{00A4}',
    // 0xA0-0xAF
    '\u{00B5}', '~', 's', 't', 'u', 'v', 'w', 'x',
    'y', 'z', '\u{00A1}', '\u{00BF}', '\u{00D0}', '\u{00DD}', '\u{00DE}', '\u{00AE}',
    // 0xB0-0xBF
    '^', '\u{00A3}', '\u{00A5}', '\u{00B7}', '\u{00A9}', '\u{00A7}', '\u{00B6}', '\u{00BC}',
    '\u{00BD}', '\u{00BE}', '[', ']', '\u{00AF}', '\u{00A8}', '\u{00B4}', '\u{00D7}',
    // 0xC0-0xCF
    '{', 'A', 'B', 'C', 'D', 'E', 'F', 'G',
    'H', 'I', '\u{00AD}', '\u{00F4}', '\u{00F6}', '\u{00F2}', '\u{00F3}', '\u{00F5}',
    // 0xD0-0xDF
    '}', 'J', 'K', 'L', 'M', 'N', 'O', 'P',
    'Q', 'R', '\u{00B9}', '\u{00FB}', '\u{00FC}', '\u{00F9}', '\u{00FA}', '\u{00FF}',
    // 0xE0-0xEF
    '\\', '\u{00F7}', 'S', 'T', 'U', 'V', 'W', 'X',
    'Y', 'Z', '\u{00B2}', '\u{00D4}', '\u{00D6}', '\u{00D2}', '\u{00D3}', '\u{00D5}',
    // 0xF0-0xFF
    '0', '1', '2', '3', '4', '5', '6', '7',
    '8', '9', '\u{00B3}', '\u{00DB}', '\u{00DC}', '\u{00D9}', '\u{00DA}', '\u{009F}',
];

/// Code page 1047 is 037 with four code-point pairs exchanged:
/// LF/NEL (0x15/0x25), not-sign/circumflex (0x5F/0xB0) and the
/// bracket positions (0xAD/0xBA and 0xBB/0xBD).
static CP1047_TO_CHAR: Lazy<[char; 256]> = Lazy::new(|| {
    let mut table = CP037_TO_CHAR;
    for (a, b) in [(0x15, 0x25), (0x5F, 0xB0), (0xAD, 0xBA), (0xBB, 0xBD)] {
        table.swap(a, b);
    }
    table
});

static CHAR_TO_CP037: Lazy<HashMap<char, u8>> = Lazy::new(|| reverse_table(&CP037_TO_CHAR));
static CHAR_TO_CP1047: Lazy<HashMap<char, u8>> = Lazy::new(|| reverse_table(&CP1047_TO_CHAR));

fn reverse_table(forward: &[char; 256]) -> HashMap<char, u8> {
    forward
        .iter()
        .enumerate()
        .filter(|(_, &ch)| ch != char::REPLACEMENT_CHARACTER)
        .map(|(byte, &ch)| (ch, byte as u8))
        .collect()
}

/// EBCDIC code page selected for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodePage {
    /// Code page 037, US/Canada (the default)
    #[default]
    Cp037,
    /// Code page 1047, Latin-1 / Open Systems
    Cp1047,
}

impl CodePage {
    /// Look up a code page by its configuration name ("037", "1047")
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "037" | "37" => Some(Self::Cp037),
            "1047" => Some(Self::Cp1047),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cp037 => "037",
            Self::Cp1047 => "1047",
        }
    }

    fn forward(&self) -> &[char; 256] {
        match self {
            Self::Cp037 => &CP037_TO_CHAR,
            Self::Cp1047 => &CP1047_TO_CHAR,
        }
    }

    fn reverse(&self) -> &HashMap<char, u8> {
        match self {
            Self::Cp037 => &CHAR_TO_CP037,
            Self::Cp1047 => &CHAR_TO_CP1047,
        }
    }

    /// Decode one EBCDIC byte. Undefined code points decode to U+FFFD.
    pub fn decode(&self, byte: u8) -> char {
        self.forward()[byte as usize]
    }

    /// Encode one character. Characters outside the page encode to 0x40
    /// (EBCDIC space).
    pub fn encode(&self, ch: char) -> u8 {
        self.reverse().get(&ch).copied().unwrap_or(0x40)
    }

    /// Decode a byte slice to a string
    pub fn decode_slice(&self, bytes: &[u8]) -> String {
        bytes.iter().map(|&b| self.decode(b)).collect()
    }

    /// Encode a string to EBCDIC bytes
    pub fn encode_str(&self, s: &str) -> Vec<u8> {
        s.chars().map(|ch| self.encode(ch)).collect()
    }
}

/// Decode a byte written through Graphic Escape.
///
/// GE selects the alternate (APL) character set for exactly one data
/// byte. The screen model keeps the raw byte plus a GE flag so replies
/// round-trip bit-exactly; rendering the APL graphic repertoire is not
/// attempted (graphics are out of scope), so everything except space
/// renders as U+FFFD.
pub fn decode_ge(byte: u8) -> char {
    if byte == 0x40 {
        ' '
    } else {
        char::REPLACEMENT_CHARACTER
    }
}
