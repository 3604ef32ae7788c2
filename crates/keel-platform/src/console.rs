//! Console input and output in both encodings.

use std::io::{Read, Write};

use keel_core::text::wide_to_string;

use crate::error::{PlatformError, Result};

/// Writes a narrow string to standard output.
pub fn write(text: &str) {
    let _ = std::io::stdout().write_all(text.as_bytes());
}

/// Writes a narrow string plus a newline to standard output.
pub fn write_line(text: &str) {
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(text.as_bytes());
    let _ = out.write_all(b"\n");
}

/// Writes a wide string to standard output.
pub fn write_wide(text: &[u16]) {
    write(&wide_to_string(text));
}

/// Writes a wide string plus a newline to standard output.
pub fn write_wide_line(text: &[u16]) {
    write_line(&wide_to_string(text));
}

fn read_utf8_char() -> Result<char> {
    let mut stdin = std::io::stdin().lock();
    let mut first = [0u8; 1];
    let n = stdin.read(&mut first).map_err(PlatformError::from)?;
    if n == 0 {
        return Err(PlatformError::Os(std::io::Error::from(
            std::io::ErrorKind::UnexpectedEof,
        )));
    }
    let continuation = match first[0] {
        0x00..=0x7F => 0,
        0xC0..=0xDF => 1,
        0xE0..=0xEF => 2,
        0xF0..=0xF7 => 3,
        _ => return Ok(char::REPLACEMENT_CHARACTER),
    };
    let mut bytes = vec![first[0]];
    for _ in 0..continuation {
        let mut next = [0u8; 1];
        if stdin.read(&mut next).map_err(PlatformError::from)? == 0 {
            break;
        }
        bytes.push(next[0]);
    }
    Ok(std::str::from_utf8(&bytes)
        .ok()
        .and_then(|s| s.chars().next())
        .unwrap_or(char::REPLACEMENT_CHARACTER))
}

/// Reads one character from standard input, narrowed to a byte
/// (non-ASCII input reads as `?`).
pub fn read_char() -> Result<u8> {
    let ch = read_utf8_char()?;
    Ok(if ch.is_ascii() { ch as u8 } else { b'?' })
}

/// Reads one character from standard input as a UTF-16 unit.
pub fn read_wide_char() -> Result<u16> {
    let ch = read_utf8_char()?;
    let mut units = [0u16; 2];
    Ok(ch.encode_utf16(&mut units)[0])
}
