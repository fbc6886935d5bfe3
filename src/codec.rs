//! Byte-transparent source codec (`x-user-defined`).
//!
//! Lua sources are byte strings. ASCII bytes decode to themselves; bytes
//! `0x80..=0xFF` decode to the private use chars `U+F780..=U+F7FF`, so any
//! file survives a decode/encode round trip unchanged and the printer can
//! tell raw bytes apart from real text.

const OPAQUE_BASE: u32 = 0xF700;

/// Char a source byte decodes to.
pub fn decode_byte(byte: u8) -> char {
    if byte < 0x80 {
        byte as char
    } else {
        char::from_u32(OPAQUE_BASE + byte as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
    }
}

/// Byte an opaque char stands for.
pub fn opaque_byte(c: char) -> Option<u8> {
    match c as u32 {
        code @ 0xF780..=0xF7FF => u8::try_from(code - OPAQUE_BASE).ok(),
        _ => None,
    }
}

pub fn decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&byte| decode_byte(byte)).collect()
}

/// Inverse of [`decode`]; other non-ASCII chars are written as UTF-8.
pub fn encode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match opaque_byte(c) {
            Some(byte) => out.push(byte),
            None => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out
}
