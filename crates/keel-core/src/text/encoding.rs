//! Encoding conversion between narrow (ANSI/UTF-8) and wide (UTF-16) text.
//!
//! Bounded-buffer converters return the number of units the full
//! conversion needs; at most `dst.len()` units are actually written, so
//! `needed > dst.len()` signals truncation.

/// Length of a NUL-terminated wide string, not counting the NUL.
pub fn wide_len(s: &[u16]) -> usize {
    s.iter().position(|&c| c == 0).unwrap_or(s.len())
}

/// Encodes a `str` as UTF-16 units. Test and path-plumbing helper.
pub fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

/// Decodes UTF-16 units into a `String`, substituting U+FFFD for
/// unpaired surrogates. Stops at an embedded NUL.
pub fn wide_to_string(s: &[u16]) -> String {
    String::from_utf16_lossy(&s[..wide_len(s)])
}

/// Returns `true` if `bytes` form valid UTF-8.
pub fn is_utf8(bytes: &[u8]) -> bool {
    core::str::from_utf8(bytes).is_ok()
}

fn write_truncated<T: Copy>(dst: &mut [T], src: impl Iterator<Item = T>) -> usize {
    let mut needed = 0;
    for unit in src {
        if needed < dst.len() {
            dst[needed] = unit;
        }
        needed += 1;
    }
    needed
}

/// Widens an 8-bit (Latin-1/ASCII) string unit-for-unit into UTF-16.
pub fn ansi_to_wide(dst: &mut [u16], src: &[u8]) -> usize {
    write_truncated(dst, src.iter().map(|&b| u16::from(b)))
}

/// Narrows UTF-16 units to bytes, substituting `?` above U+00FF.
pub fn wide_to_ansi(dst: &mut [u8], src: &[u16]) -> usize {
    write_truncated(
        dst,
        src.iter()
            .map(|&u| if u <= 0xFF { u as u8 } else { b'?' }),
    )
}

/// Converts UTF-8 bytes into UTF-16 units.
///
/// Invalid sequences decode as U+FFFD. Returns the unit count of the full
/// conversion; writes at most `dst.len()`.
pub fn utf8_to_wide(dst: &mut [u16], src: &[u8]) -> usize {
    let decoded = String::from_utf8_lossy(src);
    write_truncated(dst, decoded.encode_utf16())
}

/// Converts UTF-16 units into UTF-8 bytes.
///
/// Unpaired surrogates encode as U+FFFD. Returns the byte count of the
/// full conversion; writes at most `dst.len()`.
pub fn wide_to_utf8(dst: &mut [u8], src: &[u16]) -> usize {
    let mut buf = [0u8; 4];
    let mut needed = 0;
    for ch in core::char::decode_utf16(src.iter().copied()) {
        let ch = ch.unwrap_or(char::REPLACEMENT_CHARACTER);
        for &b in ch.encode_utf8(&mut buf).as_bytes() {
            if needed < dst.len() {
                dst[needed] = b;
            }
            needed += 1;
        }
    }
    needed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_round_trips_between_encodings() {
        let mut wide_buf = [0u16; 16];
        let n = ansi_to_wide(&mut wide_buf, b"engine");
        assert_eq!(n, 6);
        let mut narrow_buf = [0u8; 16];
        let m = wide_to_ansi(&mut narrow_buf, &wide_buf[..n]);
        assert_eq!(&narrow_buf[..m], b"engine");
    }

    #[test]
    fn utf8_conversion_counts_full_requirement() {
        // "中" is one UTF-16 unit but three UTF-8 bytes.
        let mut wide_buf = [0u16; 8];
        let n = utf8_to_wide(&mut wide_buf, "a中b".as_bytes());
        assert_eq!(n, 3);
        let mut narrow_buf = [0u8; 8];
        let m = wide_to_utf8(&mut narrow_buf, &wide_buf[..n]);
        assert_eq!(m, 5);
        assert_eq!(&narrow_buf[..m], "a中b".as_bytes());
    }

    #[test]
    fn truncation_reports_needed_units() {
        let mut tiny = [0u16; 2];
        let needed = ansi_to_wide(&mut tiny, b"abcdef");
        assert_eq!(needed, 6);
        assert_eq!(&tiny, &[u16::from(b'a'), u16::from(b'b')]);
    }

    #[test]
    fn non_ansi_units_narrow_to_question_mark() {
        let src: Vec<u16> = wide("中a");
        let mut out = [0u8; 8];
        let n = wide_to_ansi(&mut out, &src);
        assert_eq!(&out[..n], b"?a");
    }

    #[test]
    fn utf8_probe() {
        assert!(is_utf8(b"plain ascii"));
        assert!(is_utf8("中文".as_bytes()));
        assert!(!is_utf8(&[0xFF, 0xFE, 0x00]));
    }

    #[test]
    fn wide_len_honors_terminator() {
        assert_eq!(wide_len(&[0x61, 0x62, 0, 0x63]), 2);
        assert_eq!(wide_len(&[0x61, 0x62]), 2);
    }
}
