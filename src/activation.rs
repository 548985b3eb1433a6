//! Activation functions applied elementwise to fixed-point buffers.
//!
//! The set is closed: a layer can only be linear, tanh or sigmoid, which are the
//! nonlinearities the fixed-point approximations in [`crate::fixed_point`] cover.

use serde::{Deserialize, Serialize};

use crate::errors::{FixedPointResult, InferenceError, InferenceResult};
use crate::fixed_point::{self, FixedPoint, Precision};

/// Represents the type of activation function to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Activation {
    /// Pass-through: f(x) = x.
    #[default]
    Linear,
    /// Hyperbolic tangent, rational approximation clipped to [-1, 1].
    Tanh,
    /// Logistic function derived from tanh: f(x) = (tanh(x/2) + 1) / 2.
    Sigmoid,
}

impl Activation {
    /// Get activation by string name.
    pub fn get_by_name(type_name: &str) -> Option<Self> {
        match type_name {
            "LINEAR" => Some(Activation::Linear),
            "TANH" => Some(Activation::Tanh),
            "SIGMOID" => Some(Activation::Sigmoid),
            _ => None,
        }
    }

    /// Like [`Activation::get_by_name`], but reports an unknown name as an error.
    pub fn from_name(type_name: &str) -> InferenceResult<Self> {
        Self::get_by_name(type_name).ok_or_else(|| InferenceError::UnknownActivation {
            name: type_name.to_string(),
        })
    }

    /// Fails when the nonlinearity has no approximation at `precision`.
    pub fn check_precision(self, precision: Precision) -> FixedPointResult<()> {
        match self {
            Activation::Linear => Ok(()),
            Activation::Tanh => precision.require_nonlinear("tanh"),
            Activation::Sigmoid => precision.require_nonlinear("sigmoid"),
        }
    }

    /// Apply the activation function to a single value.
    #[inline(always)]
    pub fn apply_single(self, x: FixedPoint, precision: Precision) -> FixedPointResult<FixedPoint> {
        match self {
            Activation::Linear => Ok(fixed_point::identity(x, precision)),
            Activation::Tanh => fixed_point::tanh(x, precision),
            Activation::Sigmoid => fixed_point::sigmoid(x, precision),
        }
    }

    /// Apply the activation function to a slice of values in place.
    pub fn apply_in_place(self, values: &mut [FixedPoint], precision: Precision) -> FixedPointResult<()> {
        if self == Activation::Linear {
            return Ok(());
        }
        for value in values.iter_mut() {
            *value = self.apply_single(*value, precision)?;
        }
        Ok(())
    }
}
