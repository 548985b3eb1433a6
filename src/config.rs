//! JSON-backed description of a model's shape and of a benchmark run.
//!
//! Weights are never part of the configuration; it only fixes the sizes a set of
//! weights has to agree with (see [`crate::SequenceModel::from_config`]).

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, ConfigResult};
use crate::fixed_point::{MAX_NONLINEAR_PRECISION, MIN_NONLINEAR_PRECISION, Precision};
use crate::layers::CellType;
use crate::sequence_model::{ModelClass, OutputType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub model_class: ModelClass,
    /// Number of fractional bits shared by every value in the model.
    pub precision: u8,
    pub cell_type: CellType,
    pub input_size: usize,
    /// Rows produced by the embedding stack and consumed by the cell.
    pub embedding_size: usize,
    pub state_size: usize,
    /// Rows produced by each output layer except the last.
    pub output_hidden_units: Vec<usize>,
    pub output_size: usize,
    pub seq_length: usize,
    /// Interleaved subsequences an adaptive model processes, one per level.
    pub num_levels: usize,
    pub output_type: OutputType,
    pub num_executions: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model_class: ModelClass::Standard,
            precision: 8,
            cell_type: CellType::Gru,
            input_size: 4,
            embedding_size: 8,
            state_size: 8,
            output_hidden_units: vec![8],
            output_size: 3,
            seq_length: 20,
            num_levels: 1,
            output_type: OutputType::MultiClassification,
            num_executions: 1000,
        }
    }
}

impl InferenceConfig {
    /// Reads and validates a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(path, &content)
    }

    /// Like [`InferenceConfig::load`], falling back to the defaults when the file
    /// does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(path, &content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    "Config file '{}' not found, using default configuration",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    fn parse(path: &Path, content: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> ConfigResult<()> {
        let precision = self.precision()?;
        if precision.bits() < MIN_NONLINEAR_PRECISION || precision.bits() > MAX_NONLINEAR_PRECISION
        {
            return Err(invalid(
                "precision",
                format!(
                    "must be between {} and {} for the cell nonlinearities",
                    MIN_NONLINEAR_PRECISION, MAX_NONLINEAR_PRECISION
                ),
            ));
        }

        for (field, value) in [
            ("input_size", self.input_size),
            ("embedding_size", self.embedding_size),
            ("state_size", self.state_size),
            ("output_size", self.output_size),
            ("seq_length", self.seq_length),
            ("num_levels", self.num_levels),
            ("num_executions", self.num_executions),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0".to_string()));
            }
        }
        if let Some(index) = self.output_hidden_units.iter().position(|&units| units == 0) {
            return Err(invalid(
                "output_hidden_units",
                format!("layer {} must have at least one unit", index),
            ));
        }
        if self.seq_length % self.num_levels != 0 {
            return Err(invalid(
                "num_levels",
                format!("must divide seq_length ({})", self.seq_length),
            ));
        }
        if self.model_class == ModelClass::Standard && self.num_levels != 1 {
            return Err(invalid(
                "num_levels",
                "a standard model runs a single level".to_string(),
            ));
        }
        if self.output_type == OutputType::MultiClassification && self.output_size < 2 {
            return Err(invalid(
                "output_size",
                "multi-class output needs at least 2 classes".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured precision as a checked [`Precision`].
    pub fn precision(&self) -> ConfigResult<Precision> {
        Ok(Precision::new(self.precision)?)
    }
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message,
    }
}
