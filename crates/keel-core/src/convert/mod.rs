//! Locale-free numeric conversion.
//!
//! Integer and floating-point conversion to and from text in both
//! encodings, with explicit radix handling and overflow saturation in the
//! manner of the classic `strtol` contract. No locale is ever consulted.

mod float;
mod int;

pub use float::{f32_to_text, f64_to_text, parse_bool, parse_f32, parse_f64};
pub use int::{
    i32_to_text, i64_to_text, parse_i32, parse_i64, parse_u32, parse_u64, u32_to_text,
    u64_to_text,
};

pub(crate) use int::render_magnitude;

/// Outcome of a text-to-integer conversion.
///
/// `Overflow`/`Underflow` mean the result was saturated to the
/// representable range, as distinct from a legitimately parsed boundary
/// value, which reports `Ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    Ok,
    Overflow,
    Underflow,
    InvalidRadix,
}
