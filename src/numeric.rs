//! Decimal-correct arithmetic over a fixed precision context.
//!
//! Every operand is normalized to [`PRECISION`] significant digits (half-even)
//! before an operation, and every result is normalized again afterwards. Explicit
//! rounding operations use half-up unless they say otherwise. Nothing here touches
//! native floating point.
//!
//! # Range
//!
//! Numbers are 96-bit integers scaled by at most [`MAX_SCALE`] fractional
//! digits, not a floating exponent. Two limits follow:
//!
//! - magnitudes above [`Decimal::MAX`] (about 7.9e28) are
//!   [`ArithmeticError::Overflow`];
//! - results smaller than `1e-12` keep every digit down to the 28th decimal
//!   place and no further, so they carry fewer than [`PRECISION`] significant
//!   digits (`1 / 3e15` is `0.0000000000000003333333333333`).

use std::cmp::Ordering;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use thiserror::Error;

/// Significant decimal digits kept by every normalized number (decimal64).
pub const PRECISION: u32 = 16;

/// Most fractional digits a number can carry.
pub const MAX_SCALE: u32 = 28;

/// Failures raised by the numeric kernel. These are never recovered locally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("numeric overflow in {operation}")]
    Overflow { operation: &'static str },

    #[error("cannot raise {base} to fractional power {exponent}")]
    InvalidPower { base: Decimal, exponent: Decimal },

    #[error("invalid number literal '{literal}'")]
    InvalidNumber { literal: String },
}

/// Reduce `n` to [`PRECISION`] significant digits (half-even) and strip trailing zeros.
#[must_use]
pub fn normalize(n: Decimal) -> Decimal {
    if n.is_zero() {
        return Decimal::ZERO;
    }
    n.round_sf_with_strategy(PRECISION, RoundingStrategy::MidpointNearestEven)
        .unwrap_or(n)
        .normalize()
}

/// Parse a plain or scientific decimal literal and normalize it.
///
/// # Errors
///
/// Returns [`ArithmeticError::InvalidNumber`] if the literal is not a decimal.
pub fn parse(literal: &str) -> Result<Decimal, ArithmeticError> {
    let trimmed = literal.trim();
    let parsed = if trimmed.contains(['e', 'E']) {
        Decimal::from_scientific(trimmed)
    } else {
        Decimal::from_str(trimmed)
    };
    parsed
        .map(normalize)
        .map_err(|_| ArithmeticError::InvalidNumber {
            literal: literal.to_owned(),
        })
}

fn binary(
    operation: &'static str,
    a: Decimal,
    b: Decimal,
    op: impl FnOnce(Decimal, Decimal) -> Option<Decimal>,
) -> Result<Decimal, ArithmeticError> {
    op(normalize(a), normalize(b))
        .map(normalize)
        .ok_or(ArithmeticError::Overflow { operation })
}

/// # Errors
///
/// Returns [`ArithmeticError::Overflow`] when the sum leaves the decimal range.
pub fn add(a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
    binary("add", a, b, |a, b| a.checked_add(b))
}

/// # Errors
///
/// Returns [`ArithmeticError::Overflow`] when the difference leaves the decimal range.
pub fn subtract(a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
    binary("subtract", a, b, |a, b| a.checked_sub(b))
}

/// # Errors
///
/// Returns [`ArithmeticError::Overflow`] when the product leaves the decimal range.
pub fn multiply(a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
    binary("multiply", a, b, |a, b| a.checked_mul(b))
}

/// # Errors
///
/// Returns [`ArithmeticError::DivisionByZero`] when `b` is zero.
pub fn divide(a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
    if normalize(b).is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }
    binary("divide", a, b, |a, b| a.checked_div(b))
}

/// Truncated remainder; the result carries the sign of the dividend.
///
/// # Errors
///
/// Returns [`ArithmeticError::DivisionByZero`] when `b` is zero.
pub fn modulus(a: Decimal, b: Decimal) -> Result<Decimal, ArithmeticError> {
    if normalize(b).is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }
    binary("modulus", a, b, |a, b| a.checked_rem(b))
}

/// Raise `base` to `exponent`.
///
/// Integral exponents are computed exactly (negative ones through [`divide`]);
/// fractional exponents of a non-negative base are approximated and then
/// normalized.
///
/// # Errors
///
/// Returns [`ArithmeticError::InvalidPower`] for a negative base with a
/// fractional exponent, [`ArithmeticError::DivisionByZero`] for zero raised to a
/// negative power, and [`ArithmeticError::Overflow`] when the result is out of range.
pub fn power(base: Decimal, exponent: Decimal) -> Result<Decimal, ArithmeticError> {
    let base = normalize(base);
    let exponent = normalize(exponent);
    let overflow = ArithmeticError::Overflow { operation: "power" };

    if exponent.fract().is_zero() {
        let exp = exponent.to_i64().ok_or(overflow.clone())?;
        let magnitude = base
            .checked_powu(exp.unsigned_abs())
            .ok_or(overflow)?;
        return if exp < 0 {
            divide(Decimal::ONE, magnitude)
        } else {
            Ok(normalize(magnitude))
        };
    }

    if base.is_sign_negative() && !base.is_zero() {
        return Err(ArithmeticError::InvalidPower { base, exponent });
    }
    base.checked_powd(exponent).map(normalize).ok_or(overflow)
}

fn round_with(n: Decimal, scale: u32, strategy: RoundingStrategy) -> Decimal {
    normalize(n)
        .round_dp_with_strategy(scale, strategy)
        .normalize()
}

/// Round to an integer, half-up.
#[must_use]
pub fn round(n: Decimal) -> Decimal {
    round_with(n, 0, RoundingStrategy::MidpointAwayFromZero)
}

/// Round to an integer, half-even.
#[must_use]
pub fn round_even(n: Decimal) -> Decimal {
    round_with(n, 0, RoundingStrategy::MidpointNearestEven)
}

/// Round to `scale` fractional digits, half-up, then strip trailing zeros.
#[must_use]
pub fn round_to(n: Decimal, scale: u32) -> Decimal {
    round_with(n, scale, RoundingStrategy::MidpointAwayFromZero)
}

/// Round to `scale` fractional digits, half-even, then strip trailing zeros.
#[must_use]
pub fn round_even_to(n: Decimal, scale: u32) -> Decimal {
    round_with(n, scale, RoundingStrategy::MidpointNearestEven)
}

#[must_use]
pub fn floor(n: Decimal) -> Decimal {
    normalize(n).floor().normalize()
}

#[must_use]
pub fn ceil(n: Decimal) -> Decimal {
    normalize(n).ceil().normalize()
}

#[must_use]
pub fn abs(n: Decimal) -> Decimal {
    normalize(n).abs()
}

/// Numeric comparison after normalization, so `1` and `1.00` are equal.
#[must_use]
pub fn compare(a: Decimal, b: Decimal) -> Ordering {
    normalize(a).cmp(&normalize(b))
}

#[must_use]
pub fn are_equal(a: Decimal, b: Decimal) -> bool {
    compare(a, b) == Ordering::Equal
}

/// Whether `value` belongs to the stepped set bounded by `min` and `max`.
///
/// Missing bounds are unbounded. With a `step`, the value must also sit a whole
/// number of steps away from the anchor: `min`, else `max`, else zero.
///
/// # Errors
///
/// Returns [`ArithmeticError::DivisionByZero`] when `step` is zero.
pub fn is_value_in_number_set(
    value: Decimal,
    min: Option<Decimal>,
    max: Option<Decimal>,
    step: Option<Decimal>,
) -> Result<bool, ArithmeticError> {
    if min.is_some_and(|min| compare(value, min) == Ordering::Less) {
        return Ok(false);
    }
    if max.is_some_and(|max| compare(value, max) == Ordering::Greater) {
        return Ok(false);
    }
    let Some(step) = step else {
        return Ok(true);
    };
    let anchor = min.or(max).unwrap_or(Decimal::ZERO);
    let offset = subtract(value, anchor)?;
    Ok(modulus(offset, step)?.is_zero())
}

/// Locale-independent plain rendering with trailing zeros stripped.
#[must_use]
pub fn to_plain_string(n: Decimal) -> String {
    normalize(n).to_string()
}
