//! Printf-style formatted output over typed arguments.
//!
//! The engine interprets a format string as literal spans interleaved
//! with `%`-directives (`c s d i u x X o p f e E g G`, flags `- + space
//! # 0`, width/precision literal or from `*`, length modifiers
//! `h hh l ll`), rendering into any [`FormatTarget`]. The variadic
//! argument stream of the C tradition is replaced by [`FormatArg`], a
//! typed value sequence: a directive whose argument has the wrong type is
//! emitted verbatim instead of corrupting unrelated output.
//!
//! Argument width follows the C model: `d i u x X o` consume a 32-bit
//! value unless `ll` widens to 64 bits (`h`/`hh` narrow further). The
//! value stored in a [`FormatArg`] is truncated accordingly.

mod directive;
mod target;

pub use directive::{Directive, FormatFlags, LengthMod, Precision, Width, parse_directive};
pub use target::{BufferTarget, CountTarget, FormatTarget, VecTarget};

use crate::convert::render_magnitude;
use crate::text::TextUnit;

// ---------------------------------------------------------------------------
// Typed arguments
// ---------------------------------------------------------------------------

/// One value of the format argument stream.
///
/// String variants carry `None` for the null-pointer case, which renders
/// as the fixed `(null)` placeholder.
#[derive(Debug, Clone, Copy)]
pub enum FormatArg<'a> {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Char(u32),
    Str(Option<&'a [u8]>),
    WideStr(Option<&'a [u16]>),
    Pointer(usize),
}

impl From<i32> for FormatArg<'_> {
    fn from(v: i32) -> Self {
        FormatArg::Signed(i64::from(v))
    }
}
impl From<i64> for FormatArg<'_> {
    fn from(v: i64) -> Self {
        FormatArg::Signed(v)
    }
}
impl From<u32> for FormatArg<'_> {
    fn from(v: u32) -> Self {
        FormatArg::Unsigned(u64::from(v))
    }
}
impl From<u64> for FormatArg<'_> {
    fn from(v: u64) -> Self {
        FormatArg::Unsigned(v)
    }
}
impl From<f32> for FormatArg<'_> {
    fn from(v: f32) -> Self {
        FormatArg::Float(f64::from(v))
    }
}
impl From<f64> for FormatArg<'_> {
    fn from(v: f64) -> Self {
        FormatArg::Float(v)
    }
}
impl From<char> for FormatArg<'_> {
    fn from(v: char) -> Self {
        FormatArg::Char(v as u32)
    }
}
impl<'a> From<&'a str> for FormatArg<'a> {
    fn from(v: &'a str) -> Self {
        FormatArg::Str(Some(v.as_bytes()))
    }
}
impl<'a> From<&'a [u8]> for FormatArg<'a> {
    fn from(v: &'a [u8]) -> Self {
        FormatArg::Str(Some(v))
    }
}
impl<'a> From<&'a [u16]> for FormatArg<'a> {
    fn from(v: &'a [u16]) -> Self {
        FormatArg::WideStr(Some(v))
    }
}

/// Builds a `[FormatArg; N]` from mixed values via `From`.
#[macro_export]
macro_rules! fmt_args {
    ($($value:expr),* $(,)?) => {
        [$($crate::fmt::FormatArg::from($value)),*]
    };
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Formats into a bounded buffer, always terminating when the buffer is
/// non-empty. Returns the count an unbounded render would have produced
/// (terminator excluded), so `result >= buf.len()` signals truncation.
pub fn format_to_slice<C: TextUnit>(buf: &mut [C], fmt: &[C], args: &[FormatArg<'_>]) -> usize {
    let mut t = BufferTarget::new(buf);
    format_into(&mut t, fmt, args);
    t.finish()
}

/// Formats into a growable vector; returns units appended.
pub fn format_to_vec<C: TextUnit>(out: &mut Vec<C>, fmt: &[C], args: &[FormatArg<'_>]) -> usize {
    let mut t = VecTarget::new(out);
    format_into(&mut t, fmt, args);
    t.written()
}

/// Measures a render without storing it.
pub fn formatted_len<C: TextUnit>(fmt: &[C], args: &[FormatArg<'_>]) -> usize {
    let mut t = CountTarget::new();
    format_into::<C>(&mut t, fmt, args);
    <CountTarget as FormatTarget<C>>::written(&t)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A directive with `*` width/precision already pulled from the stream.
struct Resolved {
    flags: FormatFlags,
    width: usize,
    precision: Option<usize>,
    length: LengthMod,
    conversion: u8,
}

/// Runs the state machine: literal copy, directive parse, argument fetch,
/// render. Malformed directives and argument mismatches fall back to
/// verbatim output.
pub fn format_into<C: TextUnit>(
    target: &mut dyn FormatTarget<C>,
    fmt: &[C],
    args: &[FormatArg<'_>],
) {
    let len = fmt.len();
    let mut pos = 0;
    let mut arg_index = 0;

    while pos < len {
        if !fmt[pos].is(b'%') {
            let run = pos;
            while pos < len && !fmt[pos].is(b'%') {
                pos += 1;
            }
            for &u in &fmt[run..pos] {
                target.push(u);
            }
            continue;
        }

        if pos + 1 < len && fmt[pos + 1].is(b'%') {
            target.push(C::from_ascii(b'%'));
            pos += 2;
            continue;
        }

        let Some((directive, used)) = parse_directive(&fmt[pos + 1..]) else {
            // Not a directive: pass the '%' through; what follows is
            // re-scanned as literal text.
            target.push(fmt[pos]);
            pos += 1;
            continue;
        };
        let end = pos + 1 + used;

        let mut resolved = Resolved {
            flags: directive.flags,
            width: 0,
            precision: None,
            length: directive.length,
            conversion: directive.conversion,
        };

        let mut bad = false;
        match directive.width {
            Width::None => {}
            Width::Fixed(w) => resolved.width = w,
            Width::FromArg => match take_int(args, &mut arg_index) {
                Some(w) if w < 0 => {
                    // Negative width means left alignment.
                    resolved.flags.left_justify = true;
                    resolved.flags.zero_pad = false;
                    resolved.width = w.unsigned_abs() as usize;
                }
                Some(w) => resolved.width = w as usize,
                None => bad = true,
            },
        }
        match directive.precision {
            Precision::None => {}
            Precision::Fixed(p) => resolved.precision = Some(p),
            Precision::FromArg => match take_int(args, &mut arg_index) {
                // Negative precision means no precision at all.
                Some(p) => resolved.precision = (p >= 0).then_some(p as usize),
                None => bad = true,
            },
        }

        let rendered = if bad {
            false
        } else if let Some(&arg) = args.get(arg_index) {
            arg_index += 1;
            render_directive(target, &resolved, arg)
        } else {
            false
        };

        if !rendered {
            for &u in &fmt[pos..end] {
                target.push(u);
            }
        }
        pos = end;
    }
}

fn take_int(args: &[FormatArg<'_>], arg_index: &mut usize) -> Option<i64> {
    let value = match args.get(*arg_index)? {
        FormatArg::Signed(v) => *v,
        FormatArg::Unsigned(v) => *v as i64,
        _ => return None,
    };
    *arg_index += 1;
    Some(value)
}

fn render_directive<C: TextUnit>(
    target: &mut dyn FormatTarget<C>,
    r: &Resolved,
    arg: FormatArg<'_>,
) -> bool {
    match r.conversion {
        b'd' | b'i' => {
            let value = match arg {
                FormatArg::Signed(v) => v,
                FormatArg::Unsigned(v) => v as i64,
                _ => return false,
            };
            let value = clamp_signed(value, r.length);
            emit_int(target, r, value.unsigned_abs(), value < 0);
        }
        b'u' | b'x' | b'X' | b'o' => {
            let value = match arg {
                FormatArg::Unsigned(v) => v,
                FormatArg::Signed(v) => v as u64,
                _ => return false,
            };
            emit_int(target, r, clamp_unsigned(value, r.length), false);
        }
        b'p' => {
            let value = match arg {
                FormatArg::Pointer(v) => v as u64,
                FormatArg::Unsigned(v) => v,
                _ => return false,
            };
            // Pointers render as full-width uppercase hex; '#' adds 0X.
            let p = Resolved {
                flags: r.flags,
                width: r.width,
                precision: Some(2 * size_of::<usize>()),
                length: LengthMod::Ll,
                conversion: b'X',
            };
            emit_int(target, &p, value, false);
        }
        b'c' => {
            let code = match arg {
                FormatArg::Char(c) => c,
                FormatArg::Signed(v) => v as u32,
                FormatArg::Unsigned(v) => v as u32,
                _ => return false,
            };
            let unit = [C::from_code_lossy(code)];
            let single = Resolved {
                precision: None,
                ..copy_resolved(r)
            };
            emit_units(target, &single, &unit);
        }
        b's' => match arg {
            FormatArg::Str(Some(s)) => emit_transcoded(target, r, s),
            FormatArg::WideStr(Some(s)) => emit_transcoded(target, r, s),
            FormatArg::Str(None) | FormatArg::WideStr(None) => emit_null_placeholder(target, r),
            _ => return false,
        },
        b'f' | b'e' | b'E' | b'g' | b'G' => {
            let value = match arg {
                FormatArg::Float(v) => v,
                _ => return false,
            };
            emit_float(target, r, value);
        }
        _ => return false,
    }
    true
}

fn copy_resolved(r: &Resolved) -> Resolved {
    Resolved {
        flags: r.flags,
        width: r.width,
        precision: r.precision,
        length: r.length,
        conversion: r.conversion,
    }
}

fn clamp_signed(v: i64, l: LengthMod) -> i64 {
    match l {
        LengthMod::Hh => i64::from(v as i8),
        LengthMod::H => i64::from(v as i16),
        LengthMod::None | LengthMod::L => i64::from(v as i32),
        LengthMod::Ll => v,
    }
}

fn clamp_unsigned(v: u64, l: LengthMod) -> u64 {
    match l {
        LengthMod::Hh => u64::from(v as u8),
        LengthMod::H => u64::from(v as u16),
        LengthMod::None | LengthMod::L => u64::from(v as u32),
        LengthMod::Ll => v,
    }
}

// ---------------------------------------------------------------------------
// Integer rendering
// ---------------------------------------------------------------------------

fn pad<C: TextUnit>(target: &mut dyn FormatTarget<C>, byte: u8, count: usize) {
    for _ in 0..count {
        target.push(C::from_ascii(byte));
    }
}

fn push_ascii<C: TextUnit>(target: &mut dyn FormatTarget<C>, bytes: &[u8]) {
    for &b in bytes {
        target.push(C::from_ascii(b));
    }
}

fn emit_int<C: TextUnit>(
    target: &mut dyn FormatTarget<C>,
    r: &Resolved,
    magnitude: u64,
    negative: bool,
) {
    let (radix, uppercase) = match r.conversion {
        b'o' => (8, false),
        b'x' => (16, false),
        b'X' => (16, true),
        _ => (10, false),
    };

    // Precision 0 with value 0 renders an empty numeric field.
    let suppress = magnitude == 0 && r.precision == Some(0);
    let mut digit_buf = [0u8; 64];
    let ndigits = if suppress {
        0
    } else {
        render_magnitude(magnitude, radix, uppercase, &mut digit_buf)
    };
    let digits = &digit_buf[64 - ndigits..];

    let sign: Option<u8> = match r.conversion {
        b'd' | b'i' => {
            if negative {
                Some(b'-')
            } else if r.flags.force_sign {
                Some(b'+')
            } else if r.flags.space_sign {
                Some(b' ')
            } else {
                None
            }
        }
        _ => None,
    };

    // '#' adds a hex prefix unless the value is zero.
    let prefix: &[u8] = match r.conversion {
        b'x' if r.flags.alt_form && magnitude != 0 => b"0x",
        b'X' if r.flags.alt_form && magnitude != 0 => b"0X",
        _ => b"",
    };

    let mut zero_digits = r.precision.unwrap_or(1).saturating_sub(ndigits);

    // '#' on octal forces a leading zero unless one is already there.
    if r.conversion == b'o'
        && r.flags.alt_form
        && zero_digits == 0
        && digits.first() != Some(&b'0')
    {
        zero_digits = 1;
    }

    // An explicit precision disables the '0' flag.
    let zero_pad_field =
        r.flags.zero_pad && r.precision.is_none() && !r.flags.left_justify;

    let content =
        usize::from(sign.is_some()) + prefix.len() + zero_digits + ndigits;
    let field_pad = r.width.saturating_sub(content);

    if !r.flags.left_justify && !zero_pad_field {
        pad(target, b' ', field_pad);
    }
    if let Some(s) = sign {
        target.push(C::from_ascii(s));
    }
    push_ascii(target, prefix);
    if zero_pad_field {
        pad(target, b'0', field_pad);
    }
    pad(target, b'0', zero_digits);
    push_ascii(target, digits);
    if r.flags.left_justify {
        pad(target, b' ', field_pad);
    }
}

// ---------------------------------------------------------------------------
// String rendering
// ---------------------------------------------------------------------------

/// Emits pre-measured units with width padding. Strings pad with '0'
/// only under an explicit '0' flag, mirroring the numeric field rule.
fn emit_units<C: TextUnit, U: TextUnit>(
    target: &mut dyn FormatTarget<C>,
    r: &Resolved,
    units: &[U],
) {
    let field_pad = r.width.saturating_sub(units.len());
    let pad_byte = if r.flags.zero_pad && !r.flags.left_justify {
        b'0'
    } else {
        b' '
    };
    if !r.flags.left_justify {
        pad(target, pad_byte, field_pad);
    }
    for &u in units {
        target.push(C::from_code_lossy(u.code()));
    }
    if r.flags.left_justify {
        pad(target, b' ', field_pad);
    }
}

/// Emits a string argument of either encoding into the target encoding.
///
/// Precision caps the units inspected, so a buffer without a terminator
/// is safe as long as it is valid up to the cap. Copy stops at a NUL.
fn emit_transcoded<C: TextUnit, U: TextUnit>(
    target: &mut dyn FormatTarget<C>,
    r: &Resolved,
    s: &[U],
) {
    let limit = r.precision.unwrap_or(usize::MAX).min(s.len());
    let capped = &s[..limit];
    let len = capped
        .iter()
        .position(|&u| u == U::NUL)
        .unwrap_or(capped.len());
    emit_units(target, r, &capped[..len]);
}

fn emit_null_placeholder<C: TextUnit>(target: &mut dyn FormatTarget<C>, r: &Resolved) {
    const PLACEHOLDER: &[u8] = b"(null)";
    let len = r.precision.unwrap_or(PLACEHOLDER.len()).min(PLACEHOLDER.len());
    emit_units(target, r, &PLACEHOLDER[..len]);
}

// ---------------------------------------------------------------------------
// Floating-point rendering
// ---------------------------------------------------------------------------

fn emit_float<C: TextUnit>(target: &mut dyn FormatTarget<C>, r: &Resolved, value: f64) {
    let uppercase = r.conversion.is_ascii_uppercase();
    let precision = r.precision.unwrap_or(6);

    if value.is_nan() {
        let body: &[u8] = if uppercase { b"NAN" } else { b"nan" };
        return emit_units(target, &no_zero_pad(r), body);
    }
    if value.is_infinite() {
        let body: &[u8] = match (uppercase, value < 0.0) {
            (false, false) => b"inf",
            (false, true) => b"-inf",
            (true, false) => b"INF",
            (true, true) => b"-INF",
        };
        return emit_units(target, &no_zero_pad(r), body);
    }

    let negative = value.is_sign_negative();
    let abs = value.abs();

    // Digit generation is delegated to the binary/decimal converter for
    // precision fidelity; width, sign, and padding are applied here.
    let body = match r.conversion | 0x20 {
        b'e' => style_e(abs, precision, uppercase, r.flags.alt_form),
        b'g' => style_g(abs, precision, uppercase, r.flags.alt_form),
        _ => style_f(abs, precision, r.flags.alt_form),
    };

    let sign: Option<u8> = if negative {
        Some(b'-')
    } else if r.flags.force_sign {
        Some(b'+')
    } else if r.flags.space_sign {
        Some(b' ')
    } else {
        None
    };

    let content = usize::from(sign.is_some()) + body.len();
    let field_pad = r.width.saturating_sub(content);
    let zero_pad_field = r.flags.zero_pad && !r.flags.left_justify;

    if !r.flags.left_justify && !zero_pad_field {
        pad(target, b' ', field_pad);
    }
    if let Some(s) = sign {
        target.push(C::from_ascii(s));
    }
    if zero_pad_field {
        pad(target, b'0', field_pad);
    }
    push_ascii(target, body.as_bytes());
    if r.flags.left_justify {
        pad(target, b' ', field_pad);
    }
}

fn no_zero_pad(r: &Resolved) -> Resolved {
    let mut flags = r.flags;
    flags.zero_pad = false;
    Resolved {
        flags,
        precision: None,
        ..copy_resolved(r)
    }
}

/// `%f`: fixed-point decimal.
fn style_f(value: f64, precision: usize, alt_form: bool) -> String {
    let mut s = format!("{value:.precision$}");
    if precision == 0 && alt_form {
        s.push('.');
    }
    s
}

/// `%e`: scientific notation with a two-digit minimum exponent.
fn style_e(value: f64, precision: usize, uppercase: bool, alt_form: bool) -> String {
    let e_char = if uppercase { 'E' } else { 'e' };
    if value == 0.0 {
        let mut s = if precision == 0 {
            String::from("0")
        } else {
            format!("0.{}", "0".repeat(precision))
        };
        if precision == 0 && alt_form {
            s.push('.');
        }
        s.push(e_char);
        s.push_str("+00");
        return s;
    }

    let mut exp = value.log10().floor() as i32;
    let mut mantissa = value / 10f64.powi(exp);
    let mut body = format!("{mantissa:.precision$}");
    // Rounding can carry the mantissa to 10.0; renormalize.
    if body.starts_with("10") {
        exp += 1;
        mantissa = value / 10f64.powi(exp);
        body = format!("{mantissa:.precision$}");
    }
    if precision == 0 && alt_form {
        body.push('.');
    }
    let exp_sign = if exp < 0 { '-' } else { '+' };
    format!("{body}{e_char}{exp_sign}{:02}", exp.unsigned_abs())
}

/// `%g`: `%f` or `%e`, whichever is shorter by the standard exponent
/// rule, with trailing zeros stripped unless `#` is given.
fn style_g(value: f64, precision: usize, uppercase: bool, alt_form: bool) -> String {
    let p = precision.max(1);

    if value == 0.0 {
        if alt_form && p > 1 {
            return format!("0.{}", "0".repeat(p - 1));
        }
        if alt_form {
            return String::from("0.");
        }
        return String::from("0");
    }

    let exp = value.log10().floor() as i32;
    if exp >= -4 && exp < p as i32 {
        let frac = (p as i32 - 1 - exp).max(0) as usize;
        let mut s = format!("{value:.frac$}");
        if !alt_form {
            strip_trailing_zeros(&mut s);
        }
        s
    } else {
        let mut s = style_e(value, p - 1, uppercase, alt_form);
        if !alt_form {
            if let Some(e_pos) = s.bytes().position(|b| b == b'e' || b == b'E') {
                let mut mantissa = s[..e_pos].to_string();
                strip_trailing_zeros(&mut mantissa);
                let tail = s[e_pos..].to_string();
                s = mantissa + &tail;
            }
        }
        s
    }
}

fn strip_trailing_zeros(s: &mut String) {
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
