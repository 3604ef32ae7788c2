//! Radix integer conversion (text rendering and `strtol`-style parsing).

use super::ParseStatus;
use crate::text::{TextUnit, is_space};

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Renders `value` in `radix` into the tail of `buf`, right-aligned.
///
/// Returns the digit count; the digits occupy `buf[64 - count..]`.
/// `radix` must already be validated to [2, 36].
pub(crate) fn render_magnitude(
    mut value: u64,
    radix: u32,
    uppercase: bool,
    buf: &mut [u8; 64],
) -> usize {
    let alpha = if uppercase { b'A' } else { b'a' };
    let radix = u64::from(radix);
    let mut pos = 64;
    loop {
        pos -= 1;
        let digit = (value % radix) as u8;
        buf[pos] = if digit < 10 {
            b'0' + digit
        } else {
            alpha + (digit - 10)
        };
        value /= radix;
        if value == 0 {
            break;
        }
    }
    64 - pos
}

/// Copies rendered digits (plus optional sign) into a caller buffer,
/// always leaving a terminator when the buffer has any room.
///
/// Truncation keeps the most significant digits. Returns units written,
/// not counting the terminator.
fn write_out<C: TextUnit>(negative: bool, digits: &[u8], out: &mut [C]) -> usize {
    if out.is_empty() {
        return 0;
    }
    let capacity = out.len() - 1;
    let mut written = 0;
    if negative && written < capacity {
        out[written] = C::from_ascii(b'-');
        written += 1;
    }
    for &d in digits {
        if written >= capacity {
            break;
        }
        out[written] = C::from_ascii(d);
        written += 1;
    }
    out[written] = C::NUL;
    written
}

macro_rules! check_radix {
    ($radix:expr, $out:expr) => {
        if !(2..=36).contains(&$radix) {
            debug_assert!(false, "radix {} outside [2, 36]", $radix);
            if let Some(first) = $out.first_mut() {
                *first = C::NUL;
            }
            return 0;
        }
    };
}

/// Renders an unsigned 64-bit value. Returns units written (terminator
/// excluded); the output is always terminated when `out` is non-empty.
pub fn u64_to_text<C: TextUnit>(value: u64, radix: u32, out: &mut [C]) -> usize {
    check_radix!(radix, out);
    let mut buf = [0u8; 64];
    let count = render_magnitude(value, radix, false, &mut buf);
    write_out(false, &buf[64 - count..], out)
}

/// Renders a signed 64-bit value. Radix 10 renders a leading minus for
/// negative values; other radixes render the two's-complement bit pattern.
pub fn i64_to_text<C: TextUnit>(value: i64, radix: u32, out: &mut [C]) -> usize {
    check_radix!(radix, out);
    let (negative, magnitude) = if radix == 10 && value < 0 {
        (true, value.unsigned_abs())
    } else {
        (false, value as u64)
    };
    let mut buf = [0u8; 64];
    let count = render_magnitude(magnitude, radix, false, &mut buf);
    write_out(negative, &buf[64 - count..], out)
}

/// 32-bit variant of [`u64_to_text`].
pub fn u32_to_text<C: TextUnit>(value: u32, radix: u32, out: &mut [C]) -> usize {
    u64_to_text(u64::from(value), radix, out)
}

/// 32-bit variant of [`i64_to_text`]; non-decimal radixes render the
/// 32-bit (not sign-extended) bit pattern.
pub fn i32_to_text<C: TextUnit>(value: i32, radix: u32, out: &mut [C]) -> usize {
    check_radix!(radix, out);
    if radix == 10 {
        i64_to_text(i64::from(value), radix, out)
    } else {
        u64_to_text(u64::from(value as u32), radix, out)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

struct Magnitude {
    value: u64,
    negative: bool,
    consumed: usize,
    overflowed: bool,
}

#[inline]
fn digit_value(code: u32) -> Option<u32> {
    match code {
        0x30..=0x39 => Some(code - 0x30),
        0x61..=0x7A => Some(code - 0x61 + 10),
        0x41..=0x5A => Some(code - 0x41 + 10),
        _ => None,
    }
}

#[inline]
fn is_hex_digit(code: u32) -> bool {
    digit_value(code).is_some_and(|d| d < 16)
}

/// Shared scan: whitespace, sign, radix prefix, digit accumulation with
/// overflow detection against the full `u64` range. Wrappers apply the
/// per-type limits. `Err(())` means the radix was invalid.
fn scan_magnitude<C: TextUnit>(s: &[C], radix: u32) -> Result<Magnitude, ()> {
    let len = s.len();
    let mut i = 0;

    while i < len && is_space(s[i].code()) {
        i += 1;
    }

    let mut negative = false;
    if i < len && (s[i].is(b'-') || s[i].is(b'+')) {
        negative = s[i].is(b'-');
        i += 1;
    }

    let has_hex_prefix = i + 1 < len && s[i].is(b'0') && (s[i + 1].is(b'x') || s[i + 1].is(b'X'));

    let mut radix = radix;
    if radix == 0 {
        // Autodetect: 0x => 16, leading 0 => 8, else 10.
        if has_hex_prefix && i + 2 < len && is_hex_digit(s[i + 2].code()) {
            radix = 16;
            i += 2;
        } else if i < len && s[i].is(b'0') {
            radix = 8;
        } else {
            radix = 10;
        }
    } else if radix == 16 && has_hex_prefix && i + 2 < len && is_hex_digit(s[i + 2].code()) {
        i += 2;
    }

    if !(2..=36).contains(&radix) {
        return Err(());
    }

    let cutoff = u64::MAX / u64::from(radix);
    let cutlim = u64::MAX % u64::from(radix);

    let mut value: u64 = 0;
    let mut any_digits = false;
    let mut overflowed = false;

    while i < len {
        let Some(digit) = digit_value(s[i].code()) else {
            break;
        };
        if digit >= radix {
            break;
        }
        any_digits = true;
        if !overflowed {
            if value > cutoff || (value == cutoff && u64::from(digit) > cutlim) {
                overflowed = true;
            } else {
                value = value * u64::from(radix) + u64::from(digit);
            }
        }
        i += 1;
    }

    Ok(Magnitude {
        value,
        negative,
        consumed: if any_digits { i } else { 0 },
        overflowed,
    })
}

/// Parses a signed 64-bit integer.
///
/// Skips leading whitespace, accepts an optional sign, autodetects
/// `0x`/leading-`0` radixes only when `radix` is 0, and saturates to
/// `i64::MIN`/`i64::MAX` on out-of-range input while reporting the
/// condition distinctly. Returns `(value, consumed_units, status)`.
pub fn parse_i64<C: TextUnit>(s: &[C], radix: u32) -> (i64, usize, ParseStatus) {
    let Ok(m) = scan_magnitude(s, radix) else {
        return (0, 0, ParseStatus::InvalidRadix);
    };
    let limit = if m.negative {
        1u64 << 63
    } else {
        i64::MAX as u64
    };
    if m.overflowed || m.value > limit {
        return if m.negative {
            (i64::MIN, m.consumed, ParseStatus::Underflow)
        } else {
            (i64::MAX, m.consumed, ParseStatus::Overflow)
        };
    }
    let value = if m.negative {
        (m.value as i64).wrapping_neg()
    } else {
        m.value as i64
    };
    (value, m.consumed, ParseStatus::Ok)
}

/// Parses an unsigned 64-bit integer. A leading minus negates in
/// two's-complement, as `strtoul` does.
pub fn parse_u64<C: TextUnit>(s: &[C], radix: u32) -> (u64, usize, ParseStatus) {
    let Ok(m) = scan_magnitude(s, radix) else {
        return (0, 0, ParseStatus::InvalidRadix);
    };
    if m.overflowed {
        return (u64::MAX, m.consumed, ParseStatus::Overflow);
    }
    let value = if m.negative {
        m.value.wrapping_neg()
    } else {
        m.value
    };
    (value, m.consumed, ParseStatus::Ok)
}

/// 32-bit variant of [`parse_i64`], saturating at the `i32` range.
pub fn parse_i32<C: TextUnit>(s: &[C], radix: u32) -> (i32, usize, ParseStatus) {
    let Ok(m) = scan_magnitude(s, radix) else {
        return (0, 0, ParseStatus::InvalidRadix);
    };
    let limit = if m.negative {
        1u64 << 31
    } else {
        i32::MAX as u64
    };
    if m.overflowed || m.value > limit {
        return if m.negative {
            (i32::MIN, m.consumed, ParseStatus::Underflow)
        } else {
            (i32::MAX, m.consumed, ParseStatus::Overflow)
        };
    }
    let value = if m.negative {
        (m.value as i32).wrapping_neg()
    } else {
        m.value as i32
    };
    (value, m.consumed, ParseStatus::Ok)
}

/// 32-bit variant of [`parse_u64`], saturating at `u32::MAX`.
pub fn parse_u32<C: TextUnit>(s: &[C], radix: u32) -> (u32, usize, ParseStatus) {
    let Ok(m) = scan_magnitude(s, radix) else {
        return (0, 0, ParseStatus::InvalidRadix);
    };
    if m.overflowed || m.value > u64::from(u32::MAX) {
        return (u32::MAX, m.consumed, ParseStatus::Overflow);
    }
    let value = if m.negative {
        (m.value as u32).wrapping_neg()
    } else {
        m.value as u32
    };
    (value, m.consumed, ParseStatus::Ok)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::wide;

    fn render_i64(value: i64, radix: u32) -> String {
        let mut buf = [0u8; 72];
        let n = i64_to_text(value, radix, &mut buf);
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[test]
    fn render_decimal() {
        assert_eq!(render_i64(0, 10), "0");
        assert_eq!(render_i64(42, 10), "42");
        assert_eq!(render_i64(-42, 10), "-42");
        assert_eq!(render_i64(i64::MIN, 10), "-9223372036854775808");
    }

    #[test]
    fn render_other_radixes() {
        assert_eq!(render_i64(255, 16), "ff");
        assert_eq!(render_i64(8, 8), "10");
        assert_eq!(render_i64(5, 2), "101");
        assert_eq!(render_i64(35, 36), "z");
    }

    #[test]
    fn render_negative_nondecimal_uses_bit_pattern() {
        let mut buf = [0u8; 40];
        let n = i32_to_text(-1, 16, &mut buf);
        assert_eq!(&buf[..n], b"ffffffff");
        let n = i64_to_text(-1, 16, &mut buf);
        assert_eq!(&buf[..n], b"ffffffffffffffff");
    }

    #[test]
    fn render_truncates_but_terminates() {
        let mut buf = [0xAAu8; 4];
        let n = u64_to_text(123_456, 10, &mut buf);
        assert_eq!(n, 3);
        assert_eq!(&buf, b"123\0");
    }

    #[test]
    fn render_wide_matches_narrow() {
        let mut narrow = [0u8; 32];
        let mut wide_buf = [0u16; 32];
        let n = u64_to_text(0xDEAD, 16, &mut narrow);
        let w = u64_to_text(0xDEAD, 16, &mut wide_buf);
        assert_eq!(n, w);
        let widened: Vec<u16> = narrow[..n].iter().map(|&b| u16::from(b)).collect();
        assert_eq!(&wide_buf[..w], widened.as_slice());
    }

    #[test]
    fn parse_basic_decimal() {
        let (v, n, st) = parse_i64(b"  -1234xyz", 10);
        assert_eq!((v, n, st), (-1234, 7, ParseStatus::Ok));
    }

    #[test]
    fn parse_radix_autodetect_only_at_zero() {
        let (v, n, _) = parse_i64(b"0x10", 0);
        assert_eq!((v, n), (16, 4));
        let (v, n, _) = parse_i64(b"010", 0);
        assert_eq!((v, n), (8, 3));
        let (v, n, _) = parse_i64(b"10", 0);
        assert_eq!((v, n), (10, 2));
        // Radix 10 requested: "0x10" parses the lone zero.
        let (v, n, _) = parse_i64(b"0x10", 10);
        assert_eq!((v, n), (0, 1));
    }

    #[test]
    fn parse_hex_prefix_at_radix_16() {
        let (v, n, _) = parse_i64(b"0xFF", 16);
        assert_eq!((v, n), (255, 4));
        let (v, n, _) = parse_i64(b"FF", 16);
        assert_eq!((v, n), (255, 2));
        // "0x" with no digit after it consumes only the zero.
        let (v, n, _) = parse_i64(b"0xz", 16);
        assert_eq!((v, n), (0, 1));
    }

    #[test]
    fn parse_saturates_on_overflow() {
        let (v, _, st) = parse_i64(b"9223372036854775807", 10);
        assert_eq!((v, st), (i64::MAX, ParseStatus::Ok));
        let (v, _, st) = parse_i64(b"9223372036854775808", 10);
        assert_eq!((v, st), (i64::MAX, ParseStatus::Overflow));
        let (v, _, st) = parse_i64(b"-9223372036854775808", 10);
        assert_eq!((v, st), (i64::MIN, ParseStatus::Ok));
        let (v, _, st) = parse_i64(b"-9223372036854775809", 10);
        assert_eq!((v, st), (i64::MIN, ParseStatus::Underflow));
    }

    #[test]
    fn parse_u64_negation_wraps() {
        let (v, _, st) = parse_u64(b"-1", 10);
        assert_eq!((v, st), (u64::MAX, ParseStatus::Ok));
        let (v, _, st) = parse_u64(b"18446744073709551616", 10);
        assert_eq!((v, st), (u64::MAX, ParseStatus::Overflow));
    }

    #[test]
    fn parse_32bit_saturation() {
        let (v, _, st) = parse_i32(b"2147483648", 10);
        assert_eq!((v, st), (i32::MAX, ParseStatus::Overflow));
        let (v, _, st) = parse_i32(b"-2147483648", 10);
        assert_eq!((v, st), (i32::MIN, ParseStatus::Ok));
        let (v, _, st) = parse_u32(b"4294967296", 10);
        assert_eq!((v, st), (u32::MAX, ParseStatus::Overflow));
    }

    #[test]
    fn parse_invalid_radix_is_reported() {
        let (v, n, st) = parse_i64(b"123", 1);
        assert_eq!((v, n, st), (0, 0, ParseStatus::InvalidRadix));
        let (_, _, st) = parse_u64(b"123", 37);
        assert_eq!(st, ParseStatus::InvalidRadix);
    }

    #[test]
    fn parse_no_digits_consumes_nothing() {
        let (v, n, st) = parse_i64(b"  +", 10);
        assert_eq!((v, n, st), (0, 0, ParseStatus::Ok));
        let (v, n, _) = parse_i64(b"xyz", 10);
        assert_eq!((v, n), (0, 0));
    }

    #[test]
    fn parse_wide_agrees_with_narrow() {
        for input in ["  -1234", "0x7fffffffffffffff", "zz9", "0755"] {
            let w = wide(input);
            assert_eq!(parse_i64(input.as_bytes(), 0), parse_i64(&w, 0));
        }
    }

    #[test]
    fn round_trip_all_radixes() {
        let values = [0u64, 1, 7, 255, 4096, u64::from(u32::MAX), u64::MAX];
        for radix in 2..=36 {
            for &v in &values {
                let mut buf = [0u8; 72];
                let n = u64_to_text(v, radix, &mut buf);
                let (parsed, consumed, st) = parse_u64(&buf[..n], radix);
                assert_eq!((parsed, consumed, st), (v, n, ParseStatus::Ok), "radix {radix}");
                // And the string itself reproduces.
                let mut buf2 = [0u8; 72];
                let m = u64_to_text(parsed, radix, &mut buf2);
                assert_eq!(&buf[..n], &buf2[..m]);
            }
        }
    }
}
