//! The 3200-byte textual file header.
//!
//! Stored as 40 card images of 80 characters, normally in EBCDIC (CP037).
//! Some writers emit ASCII instead; that is detected and passed through.

use crate::consts::TEXT_HEADER_SIZE;
use crate::errors::{Result, SegyError};

pub const LINES: usize = 40;
pub const LINE_WIDTH: usize = 80;

const EBCDIC_SPACE: u8 = 0x40;
const EBCDIC_QUESTION: u8 = 0x6f;

/// CP037 to printable ASCII. Control codes become spaces, characters outside
/// ASCII become '?'.
static EBCDIC_TO_ASCII: [u8; 256] = [
    0x20, 0x20, 0x20, 0x20, 0x3f, 0x20, 0x3f, 0x20, 0x3f, 0x3f, 0x3f, 0x20, 0x20, 0x20, 0x20, 0x20,
    0x20, 0x20, 0x20, 0x20, 0x3f, 0x3f, 0x20, 0x3f, 0x20, 0x20, 0x3f, 0x3f, 0x20, 0x20, 0x20, 0x20,
    0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x20, 0x20, 0x20, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x20, 0x20, 0x20,
    0x3f, 0x3f, 0x20, 0x3f, 0x3f, 0x3f, 0x3f, 0x20, 0x3f, 0x3f, 0x3f, 0x3f, 0x20, 0x20, 0x3f, 0x20,
    0x20, 0x20, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x2e, 0x3c, 0x28, 0x2b, 0x7c,
    0x26, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x21, 0x24, 0x2a, 0x29, 0x3b, 0x3f,
    0x2d, 0x2f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x2c, 0x25, 0x5f, 0x3e, 0x3f,
    0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x60, 0x3a, 0x23, 0x40, 0x27, 0x3d, 0x22,
    0x3f, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f,
    0x3f, 0x6a, 0x6b, 0x6c, 0x6d, 0x6e, 0x6f, 0x70, 0x71, 0x72, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f,
    0x3f, 0x7e, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f,
    0x5e, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x5b, 0x5d, 0x3f, 0x3f, 0x3f, 0x3f,
    0x7b, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f,
    0x7d, 0x4a, 0x4b, 0x4c, 0x4d, 0x4e, 0x4f, 0x50, 0x51, 0x52, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f,
    0x5c, 0x3f, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f,
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f, 0x3f,
];

static ASCII_TO_EBCDIC: [u8; 128] = invert();

const fn invert() -> [u8; 128] {
    let mut out = [EBCDIC_QUESTION; 128];
    let mut e = 0usize;
    while e < 256 {
        let a = EBCDIC_TO_ASCII[e];
        let placeholder = (a == b' ' && e != EBCDIC_SPACE as usize)
            || (a == b'?' && e != EBCDIC_QUESTION as usize);
        if !placeholder {
            out[a as usize] = e as u8;
        }
        e += 1;
    }
    out[b' ' as usize] = EBCDIC_SPACE;
    out
}

pub fn ebcdic_to_ascii(b: u8) -> u8 { EBCDIC_TO_ASCII[b as usize] }

pub fn ascii_to_ebcdic(b: u8) -> u8 {
    if b < 0x80 { ASCII_TO_EBCDIC[b as usize] } else { EBCDIC_QUESTION }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextHeader {
    bytes: Vec<u8>,
}

impl TextHeader {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != TEXT_HEADER_SIZE {
            return Err(SegyError::Range(format!(
                "text header needs {TEXT_HEADER_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self { bytes: bytes.to_vec() })
    }

    /// Encodes up to 40 lines of text as CP037 cards; longer lines are cut at
    /// 80 characters, short ones padded with spaces.
    pub fn from_text(text: &str) -> Self {
        let mut bytes = vec![EBCDIC_SPACE; TEXT_HEADER_SIZE];
        for (row, line) in text.lines().take(LINES).enumerate() {
            let card = &mut bytes[row * LINE_WIDTH..(row + 1) * LINE_WIDTH];
            for (dst, ch) in card.iter_mut().zip(line.chars()) {
                *dst = if ch.is_ascii() { ascii_to_ebcdic(ch as u8) } else { EBCDIC_QUESTION };
            }
        }
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] { &self.bytes }

    /// ASCII headers have more 0x20 than 0x40 bytes; EBCDIC ones the reverse.
    pub fn is_ascii(&self) -> bool {
        let ascii_spaces = self.bytes.iter().filter(|b| **b == b' ').count();
        let ebcdic_spaces = self.bytes.iter().filter(|b| **b == EBCDIC_SPACE).count();
        ascii_spaces > ebcdic_spaces
    }

    pub fn lines(&self) -> Vec<String> {
        let ascii = self.is_ascii();
        self.bytes
            .chunks(LINE_WIDTH)
            .map(|card| {
                card.iter()
                    .map(|&b| {
                        let c = if ascii { b } else { ebcdic_to_ascii(b) };
                        if (0x20..0x7f).contains(&c) { c as char } else { ' ' }
                    })
                    .collect::<String>()
            })
            .collect()
    }

    /// All 40 cards joined by newlines, trailing blanks trimmed per line.
    pub fn to_text(&self) -> String {
        self.lines().iter().map(|l| l.trim_end()).collect::<Vec<_>>().join("\n")
    }
}
