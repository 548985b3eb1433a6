//! Error types for the fixed-point inference library.
//!
//! Each layer of the library has its own error enum so callers can tell an
//! arithmetic failure apart from a shape violation or a bad configuration file.

mod config_error;
mod fixed_point_error;
mod inference_error;

pub use config_error::ConfigError;
pub use fixed_point_error::FixedPointError;
pub use inference_error::InferenceError;

/// Result type alias for scalar fixed-point operations.
pub type FixedPointResult<T> = std::result::Result<T, FixedPointError>;

/// Result type alias for matrix, layer and model operations.
pub type InferenceResult<T> = std::result::Result<T, InferenceError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
