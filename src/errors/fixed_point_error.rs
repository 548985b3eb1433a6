//! Error types for scalar fixed-point arithmetic.

use thiserror::Error;

/// Errors raised by the scalar Q-format operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedPointError {
    #[error("Division by zero: {numerator} / 0")]
    DivisionByZero { numerator: i16 },

    #[error("Fixed-point overflow: {value} does not fit in 16 bits")]
    Overflow { value: i32 },

    #[error("Invalid precision: {precision} fractional bits (maximum is {max})")]
    InvalidPrecision { precision: u8, max: u8 },

    #[error(
        "Precision {precision} is not supported by {operation}: expected between {min} and {max} fractional bits"
    )]
    UnsupportedPrecision {
        operation: &'static str,
        precision: u8,
        min: u8,
        max: u8,
    },
}
