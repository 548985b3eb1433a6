//! Scalar Q-format arithmetic on signed 16-bit values.
//!
//! A [`FixedPoint`] value `v` stored with a [`Precision`] of `p` fractional bits
//! represents the real number `v / 2^p`. The precision is never stored with the
//! value: every operation receives it explicitly and all operands of a single call
//! must share it.
//!
//! Products and quotients are formed in a 32-bit intermediate and narrowed back to
//! 16 bits with two's-complement wrapping, the same semantics an FPU-less target
//! gets from native integer instructions. The nonlinearities depend on that exact
//! wrapping, so the `checked_*` variants are provided separately for callers that
//! want overflow reported instead.

use crate::errors::{FixedPointError, FixedPointResult};

/// A signed 16-bit fixed-point value whose scale is supplied by the caller.
pub type FixedPoint = i16;

/// Largest supported number of fractional bits. `1 << 14` is the largest power of
/// two that still fits in an `i16`, so `one` stays representable.
pub const MAX_PRECISION: u8 = 14;

/// Smallest precision accepted by [`tanh`] and [`sigmoid`]. The rational
/// approximation needs a representable `1/8`.
pub const MIN_NONLINEAR_PRECISION: u8 = 3;

/// Largest precision accepted by [`tanh`] and [`sigmoid`]. Up to this precision a
/// squared input that overflows 16 bits is always past the point where the
/// approximation clips to one.
pub const MAX_NONLINEAR_PRECISION: u8 = 13;

/// Upper bound on the number of power series iterations used by [`exp`].
pub const POWER_SERIES_TERMS: usize = 7;

/// Number of fractional bits of a Q-format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Precision(u8);

impl Precision {
    /// Creates a precision of `bits` fractional bits.
    pub fn new(bits: u8) -> FixedPointResult<Self> {
        if bits > MAX_PRECISION {
            return Err(FixedPointError::InvalidPrecision {
                precision: bits,
                max: MAX_PRECISION,
            });
        }
        Ok(Self(bits))
    }

    /// Returns the number of fractional bits.
    #[inline(always)]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns the stored representation of `1.0`.
    #[inline(always)]
    pub const fn one(self) -> FixedPoint {
        1 << self.0
    }

    #[inline(always)]
    const fn scale(self) -> i32 {
        1 << self.0
    }

    pub(crate) fn require_nonlinear(self, operation: &'static str) -> FixedPointResult<()> {
        if self.0 < MIN_NONLINEAR_PRECISION || self.0 > MAX_NONLINEAR_PRECISION {
            return Err(FixedPointError::UnsupportedPrecision {
                operation,
                precision: self.0,
                min: MIN_NONLINEAR_PRECISION,
                max: MAX_NONLINEAR_PRECISION,
            });
        }
        Ok(())
    }
}

impl TryFrom<u8> for Precision {
    type Error = FixedPointError;

    fn try_from(bits: u8) -> FixedPointResult<Self> {
        Self::new(bits)
    }
}

impl From<Precision> for u8 {
    fn from(precision: Precision) -> Self {
        precision.0
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Q{}", self.0)
    }
}

/// Adds two values. Overflow wraps.
#[inline(always)]
pub fn add(x: FixedPoint, y: FixedPoint) -> FixedPoint {
    x.wrapping_add(y)
}

/// Subtracts `y` from `x`. Overflow wraps.
#[inline(always)]
pub fn sub(x: FixedPoint, y: FixedPoint) -> FixedPoint {
    x.wrapping_sub(y)
}

/// Negates a value. `i16::MIN` maps to itself.
#[inline(always)]
pub fn neg(x: FixedPoint) -> FixedPoint {
    x.wrapping_neg()
}

/// Multiplies two values sharing `precision`.
///
/// The product is formed in 32 bits and divided by `2^precision`, truncating toward
/// zero, before being narrowed with wrapping.
#[inline(always)]
pub fn mul(x: FixedPoint, y: FixedPoint, precision: Precision) -> FixedPoint {
    wide_mul(x, y, precision) as FixedPoint
}

/// Divides `x` by `y`, both sharing `precision`.
///
/// The dividend is widened to 32 bits and scaled by `2^precision` before the
/// truncating integer division; the quotient is narrowed with wrapping.
#[inline(always)]
pub fn div(x: FixedPoint, y: FixedPoint, precision: Precision) -> FixedPointResult<FixedPoint> {
    wide_div(x, y, precision).map(|quotient| quotient as FixedPoint)
}

/// Like [`add`], but reports overflow.
pub fn checked_add(x: FixedPoint, y: FixedPoint) -> FixedPointResult<FixedPoint> {
    narrow(x as i32 + y as i32)
}

/// Like [`sub`], but reports overflow.
pub fn checked_sub(x: FixedPoint, y: FixedPoint) -> FixedPointResult<FixedPoint> {
    narrow(x as i32 - y as i32)
}

/// Like [`mul`], but reports a product that does not fit in 16 bits.
pub fn checked_mul(
    x: FixedPoint,
    y: FixedPoint,
    precision: Precision,
) -> FixedPointResult<FixedPoint> {
    narrow(wide_mul(x, y, precision))
}

/// Like [`div`], but reports a quotient that does not fit in 16 bits.
pub fn checked_div(
    x: FixedPoint,
    y: FixedPoint,
    precision: Precision,
) -> FixedPointResult<FixedPoint> {
    narrow(wide_div(x, y, precision)?)
}

#[inline(always)]
fn wide_mul(x: FixedPoint, y: FixedPoint, precision: Precision) -> i32 {
    (x as i32 * y as i32) / precision.scale()
}

#[inline(always)]
fn wide_div(x: FixedPoint, y: FixedPoint, precision: Precision) -> FixedPointResult<i32> {
    if y == 0 {
        return Err(FixedPointError::DivisionByZero { numerator: x });
    }
    Ok((x as i32 * precision.scale()) / y as i32)
}

fn narrow(value: i32) -> FixedPointResult<FixedPoint> {
    FixedPoint::try_from(value).map_err(|_| FixedPointError::Overflow { value })
}

/// Rescales `x` from `old_precision` to `new_precision` fractional bits.
pub fn convert(x: FixedPoint, old_precision: Precision, new_precision: Precision) -> FixedPoint {
    ((x as i32 * new_precision.scale()) / old_precision.scale()) as FixedPoint
}

/// Quantizes a real number, truncating toward zero. Out-of-range values saturate.
pub fn from_float(x: f32, precision: Precision) -> FixedPoint {
    (x * precision.scale() as f32) as FixedPoint
}

/// Converts a stored value back to the real number it represents.
pub fn to_float(x: FixedPoint, precision: Precision) -> f32 {
    x as f32 / precision.scale() as f32
}

/// Scales an integer literal into the Q-format. Overflow wraps.
pub fn from_int(x: i16, precision: Precision) -> FixedPoint {
    (x as i32 * precision.scale()) as FixedPoint
}

/// Pass-through activation.
#[inline(always)]
pub fn identity(x: FixedPoint, _precision: Precision) -> FixedPoint {
    x
}

/// Approximates `e^x` with a truncated Maclaurin series.
///
/// Terms `x^i / i!` are accumulated until the partial sum stops changing or
/// [`POWER_SERIES_TERMS`] is reached. Negative inputs are evaluated as `1 / e^|x|`.
/// The running power and factorial live in 16 bits and wrap once they exceed it;
/// the result for large inputs is therefore unbounded garbage, as on the target.
pub fn exp(x: FixedPoint, precision: Precision) -> FixedPointResult<FixedPoint> {
    let should_invert = x < 0;
    let x = if should_invert { neg(x) } else { x };

    let one = precision.one();
    let mut result = one;
    let mut prev_result = 0;
    let mut power = one;
    let mut factorial = one;

    let mut i = 1;
    while i < POWER_SERIES_TERMS && prev_result != result {
        power = mul(x, power, precision);
        factorial = mul(factorial, (i as i32 * precision.scale()) as FixedPoint, precision);

        let term = div(power, factorial, precision)?;
        prev_result = result;
        result = add(term, result);
        i += 1;
    }

    if should_invert {
        result = div(from_int(1, precision), result, precision)?;
    }
    Ok(result)
}

/// Approximates the hyperbolic tangent with `x * (1 + x²/8) / (1 + x²/2)`.
///
/// The rational function is evaluated on `|x|` (saturated, so `i16::MIN` maps to
/// `i16::MAX`), the sign is restored and the result is clipped to `[-1, 1]`. When `x²` does not fit in 16 bits the approximation is
/// already past one, so the clipped value is returned directly.
pub fn tanh(x: FixedPoint, precision: Precision) -> FixedPointResult<FixedPoint> {
    precision.require_nonlinear("tanh")?;

    let should_invert_sign = x < 0;
    let magnitude = x.saturating_abs();

    let one = from_int(1, precision);
    let one_eighth: FixedPoint = 1 << (precision.bits() - 3);
    let one_half: FixedPoint = 1 << (precision.bits() - 1);

    let result = match checked_mul(magnitude, magnitude, precision) {
        Ok(x_squared) => {
            let numerator = add(one, mul(x_squared, one_eighth, precision));
            let denominator = add(one, mul(x_squared, one_half, precision));
            let rational_factor = div(numerator, denominator, precision)?;
            mul(magnitude, rational_factor, precision)
        }
        Err(_) => one,
    };

    let result = if should_invert_sign { neg(result) } else { result };
    Ok(result.clamp(neg(one), one))
}

/// Approximates the logistic function as `(tanh(x / 2) + 1) / 2`.
///
/// Evaluated on `|x|` and reflected as `1 - sigmoid(|x|)` for negative inputs, so
/// `sigmoid(-x) == 1 - sigmoid(x)` holds exactly.
pub fn sigmoid(x: FixedPoint, precision: Precision) -> FixedPointResult<FixedPoint> {
    precision.require_nonlinear("sigmoid")?;

    let should_invert_sign = x < 0;
    let magnitude = x.saturating_abs();

    let one = precision.one();
    let one_half: FixedPoint = 1 << (precision.bits() - 1);

    let tanh = tanh(mul(magnitude, one_half, precision), precision)?;
    let result = mul(add(tanh, one), one_half, precision);

    if should_invert_sign {
        Ok(sub(one, result))
    } else {
        Ok(result)
    }
}
