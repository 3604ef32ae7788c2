//! Format directive parsing.
//!
//! A directive is `%[flags][width][.precision][length]conversion`, parsed
//! left to right with no backtracking. The parser is generic over the
//! encoding so narrow and wide format strings share one implementation.

use crate::text::TextUnit;

/// Flags parsed from a `%`-directive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatFlags {
    pub left_justify: bool, // '-'
    pub force_sign: bool,   // '+'
    pub space_sign: bool,   // ' '
    pub alt_form: bool,     // '#'
    pub zero_pad: bool,     // '0'
}

/// Field width specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    None,
    Fixed(usize),
    FromArg, // '*'
}

/// Precision specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    None,
    Fixed(usize),
    FromArg, // '.*'
}

/// Argument-width modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthMod {
    None,
    Hh, // 'hh'
    H,  // 'h'
    L,  // 'l'
    Ll, // 'll'
}

/// A parsed format directive.
#[derive(Debug, Clone, Copy)]
pub struct Directive {
    pub flags: FormatFlags,
    pub width: Width,
    pub precision: Precision,
    pub length: LengthMod,
    pub conversion: u8,
}

/// Parses a directive starting just after the `%`.
///
/// Returns the directive plus the number of units consumed, or `None`
/// when the text is not a recognized directive (the engine then falls
/// back to verbatim output).
pub fn parse_directive<C: TextUnit>(fmt: &[C]) -> Option<(Directive, usize)> {
    let len = fmt.len();
    let mut pos = 0;

    let mut flags = FormatFlags::default();
    while pos < len {
        match fmt[pos].code() {
            0x2D => flags.left_justify = true, // '-'
            0x2B => flags.force_sign = true,   // '+'
            0x20 => flags.space_sign = true,   // ' '
            0x23 => flags.alt_form = true,     // '#'
            0x30 => flags.zero_pad = true,     // '0'
            _ => break,
        }
        pos += 1;
    }
    // '+' overrides ' '; '-' overrides '0'.
    if flags.force_sign {
        flags.space_sign = false;
    }
    if flags.left_justify {
        flags.zero_pad = false;
    }

    let width = if pos < len && fmt[pos].is(b'*') {
        pos += 1;
        Width::FromArg
    } else {
        match scan_number(fmt, &mut pos) {
            Some(w) => Width::Fixed(w),
            None => Width::None,
        }
    };

    let precision = if pos < len && fmt[pos].is(b'.') {
        pos += 1;
        if pos < len && fmt[pos].is(b'*') {
            pos += 1;
            Precision::FromArg
        } else {
            // A dot with no digits means precision 0.
            Precision::Fixed(scan_number(fmt, &mut pos).unwrap_or(0))
        }
    } else {
        Precision::None
    };

    let length = if pos < len && fmt[pos].is(b'h') {
        pos += 1;
        if pos < len && fmt[pos].is(b'h') {
            pos += 1;
            LengthMod::Hh
        } else {
            LengthMod::H
        }
    } else if pos < len && fmt[pos].is(b'l') {
        pos += 1;
        if pos < len && fmt[pos].is(b'l') {
            pos += 1;
            LengthMod::Ll
        } else {
            LengthMod::L
        }
    } else {
        LengthMod::None
    };

    if pos >= len {
        return None;
    }
    let conversion = match fmt[pos].code() {
        c @ 0x20..=0x7E => c as u8,
        _ => return None,
    };
    pos += 1;

    match conversion {
        b'c' | b's' | b'd' | b'i' | b'u' | b'x' | b'X' | b'o' | b'p' | b'f' | b'e' | b'E'
        | b'g' | b'G' => {}
        _ => return None,
    }

    Some((
        Directive {
            flags,
            width,
            precision,
            length,
            conversion,
        },
        pos,
    ))
}

fn scan_number<C: TextUnit>(fmt: &[C], pos: &mut usize) -> Option<usize> {
    let start = *pos;
    let mut value = 0usize;
    while *pos < fmt.len() && fmt[*pos].is_ascii_digit() {
        value = value
            .saturating_mul(10)
            .saturating_add((fmt[*pos].code() - 0x30) as usize);
        *pos += 1;
    }
    (*pos > start).then_some(value)
}
