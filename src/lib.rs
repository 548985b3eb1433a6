//! Fixed-point inference for small recurrent networks on targets without an FPU.
//!
//! Every value is a signed 16-bit integer in a caller-chosen Q-format. The library
//! is layered: scalar arithmetic and nonlinearity approximations in
//! [`fixed_point`], shaped buffers in [`matrix`], and the dense, GRU and
//! fused-gate GRU forward passes in [`layers`]. [`SequenceModel`] assembles those
//! into a complete embedding, recurrence and output pipeline, and
//! [`AdaptiveModel`] runs the same pipeline over interleaved subsequences with an
//! early exit once a level is confident.

pub mod activation;
pub mod adaptive_model;
pub mod config;
pub mod errors;
pub mod fixed_point;
pub mod layers;
pub mod matrix;
pub mod sequence_model;
pub mod workspace;

pub use activation::Activation;
pub use adaptive_model::{AdaptiveModel, AdaptiveWorkspace};
pub use config::InferenceConfig;
pub use errors::{ConfigError, FixedPointError, InferenceError};
pub use fixed_point::{FixedPoint, Precision};
pub use layers::{
    CellParameters, CellType, DenseLayer, FusedGruParameters, GateWeights, GruParameters,
    RecurrentCell,
};
pub use matrix::Matrix;
pub use sequence_model::{
    ModelClass, ModelWorkspace, OutputType, Prediction, PredictionValue, SequenceModel,
};
pub use workspace::{CellWorkspace, FusedGruWorkspace, GruWorkspace};
