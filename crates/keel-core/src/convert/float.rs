//! Floating-point and boolean conversion.
//!
//! Rendering delegates digit generation to the binary/decimal converter
//! in `core::fmt` for precision fidelity, then transcodes to the target
//! encoding. Parsing scans the longest valid numeric prefix and converts
//! it in one step.

use super::int::parse_i64;
use crate::text::{TextUnit, is_space};

fn copy_terminated<C: TextUnit>(body: &str, out: &mut [C]) -> usize {
    if out.is_empty() {
        return 0;
    }
    let capacity = out.len() - 1;
    let mut written = 0;
    for &b in body.as_bytes() {
        if written >= capacity {
            break;
        }
        out[written] = C::from_ascii(b);
        written += 1;
    }
    out[written] = C::NUL;
    written
}

/// Renders `value` in fixed-point form with `precision` digits after the
/// decimal point. Truncates into `out` but always terminates; returns
/// units written (terminator excluded).
pub fn f64_to_text<C: TextUnit>(value: f64, precision: usize, out: &mut [C]) -> usize {
    copy_terminated(&format!("{value:.precision$}"), out)
}

/// Single-precision variant of [`f64_to_text`].
pub fn f32_to_text<C: TextUnit>(value: f32, precision: usize, out: &mut [C]) -> usize {
    copy_terminated(&format!("{value:.precision$}"), out)
}

/// Scans the longest prefix of `s` that forms a floating-point literal:
/// optional whitespace and sign, digits with an optional fraction, an
/// optional exponent, or an `inf`/`infinity`/`nan` keyword.
///
/// Returns the ASCII rendition of the accepted prefix plus the number of
/// units consumed (0 when no number is present).
fn scan_float<C: TextUnit>(s: &[C]) -> (String, usize) {
    let len = s.len();
    let mut i = 0;
    while i < len && is_space(s[i].code()) {
        i += 1;
    }

    let mut text = String::new();
    if i < len && (s[i].is(b'+') || s[i].is(b'-')) {
        text.push(s[i].code() as u8 as char);
        i += 1;
    }

    // Keyword forms.
    let keyword = |i: usize, word: &str| -> bool {
        word.bytes().enumerate().all(|(k, b)| {
            s.get(i + k)
                .is_some_and(|u| u.code().to_ascii_lowercase_code() == u32::from(b))
        })
    };
    if keyword(i, "infinity") {
        text.push_str("inf");
        return (text, i + 8);
    }
    if keyword(i, "inf") {
        text.push_str("inf");
        return (text, i + 3);
    }
    if keyword(i, "nan") {
        text.push_str("NaN");
        return (text, i + 3);
    }

    let mut int_digits = 0;
    while i < len && s[i].is_ascii_digit() {
        text.push(s[i].code() as u8 as char);
        int_digits += 1;
        i += 1;
    }
    let mut frac_digits = 0;
    if i < len && s[i].is(b'.') {
        let dot_pos = i;
        i += 1;
        let mark = text.len();
        text.push('.');
        while i < len && s[i].is_ascii_digit() {
            text.push(s[i].code() as u8 as char);
            frac_digits += 1;
            i += 1;
        }
        if frac_digits == 0 && int_digits == 0 {
            // Lone '.' is not a number.
            text.truncate(mark);
            i = dot_pos;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return (String::new(), 0);
    }

    // Exponent only counts when at least one digit follows.
    if i < len && (s[i].is(b'e') || s[i].is(b'E')) {
        let mut j = i + 1;
        let mut exp = String::from("e");
        if j < len && (s[j].is(b'+') || s[j].is(b'-')) {
            exp.push(s[j].code() as u8 as char);
            j += 1;
        }
        let mut exp_digits = 0;
        while j < len && s[j].is_ascii_digit() {
            exp.push(s[j].code() as u8 as char);
            exp_digits += 1;
            j += 1;
        }
        if exp_digits > 0 {
            text.push_str(&exp);
            i = j;
        }
    }

    (text, i)
}

// Small helper so the keyword scan reads cleanly.
trait AsciiFold {
    fn to_ascii_lowercase_code(self) -> u32;
}
impl AsciiFold for u32 {
    #[inline]
    fn to_ascii_lowercase_code(self) -> u32 {
        if (0x41..=0x5A).contains(&self) { self + 0x20 } else { self }
    }
}

/// Parses a double from the longest valid prefix of `s`.
///
/// Returns `(value, consumed_units)`; `(0.0, 0)` when no number is
/// present.
pub fn parse_f64<C: TextUnit>(s: &[C]) -> (f64, usize) {
    let (text, consumed) = scan_float(s);
    if consumed == 0 {
        return (0.0, 0);
    }
    // A sign with no digits never reaches here, so the parse cannot fail.
    let value = text.parse::<f64>().unwrap_or(0.0);
    (value, consumed)
}

/// Single-precision variant of [`parse_f64`].
pub fn parse_f32<C: TextUnit>(s: &[C]) -> (f32, usize) {
    let (text, consumed) = scan_float(s);
    if consumed == 0 {
        return (0.0, 0);
    }
    (text.parse::<f32>().unwrap_or(0.0), consumed)
}

/// Parses a boolean: the word `true` (any case, surrounding whitespace
/// allowed) or any nonzero integer.
pub fn parse_bool<C: TextUnit>(s: &[C]) -> bool {
    let trimmed: Vec<u32> = {
        let codes: Vec<u32> = s.iter().map(|u| u.code()).collect();
        let start = codes.iter().position(|&c| !is_space(c)).unwrap_or(codes.len());
        let end = codes.iter().rposition(|&c| !is_space(c)).map_or(start, |e| e + 1);
        codes[start..end].to_vec()
    };
    let word: Vec<u32> = trimmed
        .iter()
        .map(|&c| c.to_ascii_lowercase_code())
        .collect();
    if word == [0x74, 0x72, 0x75, 0x65] {
        // "true"
        return true;
    }
    let (value, consumed, _) = parse_i64(s, 10);
    consumed > 0 && value != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::wide;

    fn render(value: f64, precision: usize) -> String {
        let mut buf = [0u8; 400];
        let n = f64_to_text(value, precision, &mut buf);
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[test]
    fn fixed_point_rendering() {
        assert_eq!(render(0.0, 2), "0.00");
        assert_eq!(render(-1.5, 3), "-1.500");
        assert_eq!(render(3.14159, 2), "3.14");
        assert_eq!(render(2.5, 0), "2");
    }

    #[test]
    fn rendering_truncates_but_terminates() {
        let mut buf = [0u8; 5];
        let n = f64_to_text(123.456, 3, &mut buf);
        assert_eq!(n, 4);
        assert_eq!(&buf, b"123.\0");
    }

    #[test]
    fn parse_plain_forms() {
        assert_eq!(parse_f64(b"2.5"), (2.5, 3));
        assert_eq!(parse_f64(b"  -0.25rest"), (-0.25, 7));
        assert_eq!(parse_f64(b".5"), (0.5, 2));
        assert_eq!(parse_f64(b"7."), (7.0, 2));
    }

    #[test]
    fn parse_exponent_requires_digits() {
        assert_eq!(parse_f64(b"1e3"), (1000.0, 3));
        assert_eq!(parse_f64(b"1.5e-2"), (0.015, 6));
        // "e" with no digits stays unconsumed.
        assert_eq!(parse_f64(b"2e"), (2.0, 1));
        assert_eq!(parse_f64(b"2e+x"), (2.0, 1));
    }

    #[test]
    fn parse_rejects_non_numbers() {
        assert_eq!(parse_f64(b"abc"), (0.0, 0));
        assert_eq!(parse_f64(b"-"), (0.0, 0));
        assert_eq!(parse_f64(b"."), (0.0, 0));
        assert_eq!(parse_f64(b""), (0.0, 0));
    }

    #[test]
    fn parse_keywords() {
        let (v, n) = parse_f64(b"inf");
        assert!(v.is_infinite() && v > 0.0);
        assert_eq!(n, 3);
        let (v, n) = parse_f64(b"-Infinity");
        assert!(v.is_infinite() && v < 0.0);
        assert_eq!(n, 9);
        let (v, n) = parse_f64(b"NaN!");
        assert!(v.is_nan());
        assert_eq!(n, 3);
    }

    #[test]
    fn parse_wide_agrees_with_narrow() {
        for input in ["2.5", "-1e10", "   3.25x", "nope"] {
            let w = wide(input);
            assert_eq!(parse_f64(input.as_bytes()), parse_f64(&w));
        }
    }

    #[test]
    fn float_round_trip_through_text() {
        for &v in &[0.0f64, 1.0, -2.5, 1234.0625, 0.015625] {
            let mut buf = [0u8; 64];
            let n = f64_to_text(v, 17, &mut buf);
            let (parsed, _) = parse_f64(&buf[..n]);
            assert_eq!(parsed, v);
        }
    }

    #[test]
    fn bool_forms() {
        assert!(parse_bool(b"true"));
        assert!(parse_bool(b" TRUE "));
        assert!(parse_bool(b"1"));
        assert!(parse_bool(b"-5"));
        assert!(!parse_bool(b"false"));
        assert!(!parse_bool(b"0"));
        assert!(!parse_bool(b""));
        assert!(!parse_bool(b"yes"));
    }
}
