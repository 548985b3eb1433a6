//! End-to-end sequence classification and regression.
//!
//! A [`SequenceModel`] embeds every input vector with a stack of dense layers,
//! folds the embedded sequence into a state with a recurrent cell, and maps the
//! final state to an output vector with a second stack of dense layers. The last
//! output layer is always evaluated as linear, and the output vector is turned
//! into a prediction according to the model's [`OutputType`].

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::config::InferenceConfig;
use crate::errors::{InferenceError, InferenceResult};
use crate::fixed_point::{FixedPoint, Precision};
use crate::layers::{CellParameters, DenseLayer, RecurrentCell};
use crate::matrix::{self, Matrix, expect_shape};
use crate::workspace::CellWorkspace;

/// Which inference pipeline a configuration describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelClass {
    /// A single pass over the whole sequence, see [`SequenceModel`].
    #[default]
    Standard,
    /// Interleaved subsequences with early exit, see [`crate::AdaptiveModel`].
    Adaptive,
}

impl ModelClass {
    pub fn name(self) -> &'static str {
        match self {
            ModelClass::Standard => "STANDARD",
            ModelClass::Adaptive => "ADAPTIVE",
        }
    }
}

/// How the output vector is turned into a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputType {
    /// Index of the largest output.
    MultiClassification,
    /// Whether the first output is positive.
    BinaryClassification,
    /// The first output.
    #[default]
    Regression,
}

impl OutputType {
    /// Get output type by string name.
    pub fn get_by_name(type_name: &str) -> Option<Self> {
        match type_name {
            "MULTI_CLASSIFICATION" => Some(OutputType::MultiClassification),
            "BINARY_CLASSIFICATION" => Some(OutputType::BinaryClassification),
            "REGRESSION" => Some(OutputType::Regression),
            _ => None,
        }
    }

    /// Like [`OutputType::get_by_name`], but reports an unknown name as an error.
    pub fn from_name(type_name: &str) -> InferenceResult<Self> {
        Self::get_by_name(type_name).ok_or_else(|| InferenceError::UnknownOutputType {
            name: type_name.to_string(),
        })
    }

    /// Derives the prediction from an output vector.
    pub fn predict(self, outputs: &Matrix) -> InferenceResult<PredictionValue> {
        match self {
            OutputType::MultiClassification => matrix::argmax(outputs).map(PredictionValue::Class),
            OutputType::BinaryClassification => first_output(outputs)
                .map(|value| PredictionValue::Binary(value > 0)),
            OutputType::Regression => first_output(outputs).map(PredictionValue::Value),
        }
    }
}

pub(crate) fn first_output(outputs: &Matrix) -> InferenceResult<FixedPoint> {
    outputs
        .as_slice()
        .first()
        .copied()
        .ok_or(InferenceError::EmptyMatrix)
}

/// The prediction derived from an output vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionValue {
    Class(usize),
    Binary(bool),
    /// Raw fixed-point output in the model's precision.
    Value(FixedPoint),
}

/// Result of one [`SequenceModel::predict`] or [`crate::AdaptiveModel::predict`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    pub value: PredictionValue,
    /// Output vector of the final dense layer at the last level executed.
    pub outputs: Matrix,
    /// Levels executed before the prediction was made. Always 1 for a
    /// [`SequenceModel`].
    pub num_levels: usize,
    /// Whether a confident level ended the computation before the last one.
    pub stopped_early: bool,
}

/// Buffers for one prediction, sized for a particular [`SequenceModel`].
#[derive(Debug, Clone)]
pub struct ModelWorkspace {
    embedding: Vec<Matrix>,
    state: Matrix,
    cell: CellWorkspace,
    output: Vec<Matrix>,
}

/// A complete recurrent model in a single Q-format.
#[derive(Debug, Clone)]
pub struct SequenceModel {
    precision: Precision,
    embedding: Vec<DenseLayer>,
    cell: CellParameters,
    output: Vec<DenseLayer>,
    output_type: OutputType,
}

impl SequenceModel {
    /// Assembles a model, checking that consecutive layers agree on their sizes.
    ///
    /// `embedding` may be empty, in which case raw inputs feed the cell directly.
    /// `output` must hold at least one layer.
    pub fn new(
        precision: Precision,
        embedding: Vec<DenseLayer>,
        cell: CellParameters,
        output: Vec<DenseLayer>,
        output_type: OutputType,
    ) -> InferenceResult<Self> {
        precision.require_nonlinear("sequence_model")?;
        if output.is_empty() {
            return Err(InferenceError::EmptyLayerStack { stack: "output" });
        }
        check_chain("embedding", &embedding, None, Some(cell.input_size()))?;
        check_chain("output", &output, Some(cell.state_size()), None)?;

        Ok(Self {
            precision,
            embedding,
            cell,
            output,
            output_type,
        })
    }

    /// Like [`SequenceModel::new`], additionally checking the layers against the
    /// sizes and types declared in `config`.
    pub fn from_config(
        config: &InferenceConfig,
        embedding: Vec<DenseLayer>,
        cell: CellParameters,
        output: Vec<DenseLayer>,
    ) -> InferenceResult<Self> {
        let precision = Precision::new(config.precision)?;
        let model = Self::new(precision, embedding, cell, output, config.output_type)?;
        check_config(
            config,
            ModelClass::Standard,
            model.input_size(),
            &model.cell,
            &model.output,
        )?;
        Ok(model)
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    pub fn cell(&self) -> &CellParameters {
        &self.cell
    }

    /// Rows of each raw input vector.
    pub fn input_size(&self) -> usize {
        self.embedding
            .first()
            .map(DenseLayer::input_size)
            .unwrap_or_else(|| self.cell.input_size())
    }

    /// Rows of the output vector.
    pub fn output_size(&self) -> usize {
        self.output
            .last()
            .map(DenseLayer::output_size)
            .unwrap_or_default()
    }

    /// Allocates the buffers [`SequenceModel::predict_with_workspace`] needs.
    pub fn workspace(&self) -> InferenceResult<ModelWorkspace> {
        Ok(ModelWorkspace {
            embedding: layer_buffers(&self.embedding)?,
            state: Matrix::column(self.cell.state_size())?,
            cell: self.cell.workspace()?,
            output: layer_buffers(&self.output)?,
        })
    }

    /// Runs the model over `inputs`, one column vector per step.
    pub fn predict(&self, inputs: &[Matrix]) -> InferenceResult<Prediction> {
        let mut workspace = self.workspace()?;
        self.predict_with_workspace(inputs, &mut workspace)
    }

    /// [`SequenceModel::predict`] reusing the buffers of `workspace`.
    pub fn predict_with_workspace(
        &self,
        inputs: &[Matrix],
        workspace: &mut ModelWorkspace,
    ) -> InferenceResult<Prediction> {
        if inputs.is_empty() {
            return Err(InferenceError::EmptyInputSequence);
        }
        for input in inputs {
            expect_shape("predict", input, (self.input_size(), 1))?;
        }
        self.check_workspace(workspace)?;

        let ModelWorkspace {
            embedding,
            state,
            cell,
            output,
        } = workspace;
        let precision = self.precision;

        debug!(
            "Predicting over {} steps with a {} cell at {}",
            inputs.len(),
            self.cell.cell_type().name(),
            precision
        );

        state.set(0);
        for (index, input) in inputs.iter().enumerate() {
            run_stack(&self.embedding, input, embedding, false, precision)?;
            let cell_input = embedding.last().unwrap_or(input);
            self.cell.step(state, cell_input, cell, precision)?;
            trace!("State after step {}: {:?}", index + 1, state.as_slice());
        }

        run_stack(&self.output, state, output, true, precision)?;
        let outputs = output.last().ok_or(InferenceError::EmptyLayerStack { stack: "output" })?;
        let value = self.output_type.predict(outputs)?;
        debug!("Prediction: {:?}", value);

        Ok(Prediction {
            value,
            outputs: outputs.clone(),
            num_levels: 1,
            stopped_early: false,
        })
    }

    fn check_workspace(&self, workspace: &ModelWorkspace) -> InferenceResult<()> {
        check_buffers("embedding", &self.embedding, &workspace.embedding)?;
        check_buffers("output", &self.output, &workspace.output)?;
        expect_shape("model_workspace", &workspace.state, (self.cell.state_size(), 1))?;
        self.cell.check_workspace(&workspace.cell)
    }
}

/// Runs `layers` in sequence, writing layer `i` into `buffers[i]`. With
/// `linear_output` the last layer ignores its activation.
pub(crate) fn run_stack(
    layers: &[DenseLayer],
    input: &Matrix,
    buffers: &mut [Matrix],
    linear_output: bool,
    precision: Precision,
) -> InferenceResult<()> {
    for (index, layer) in layers.iter().enumerate() {
        let (done, rest) = buffers.split_at_mut(index);
        let source = done.last().unwrap_or(input);
        let activation = if linear_output && index + 1 == layers.len() {
            Activation::Linear
        } else {
            layer.activation()
        };
        layer.forward_with(&mut rest[0], source, activation, precision)?;
    }
    Ok(())
}

pub(crate) fn layer_buffers(layers: &[DenseLayer]) -> InferenceResult<Vec<Matrix>> {
    layers
        .iter()
        .map(|layer| Matrix::column(layer.output_size()))
        .collect()
}

pub(crate) fn check_buffers(
    stack: &'static str,
    layers: &[DenseLayer],
    buffers: &[Matrix],
) -> InferenceResult<()> {
    if layers.len() != buffers.len() {
        return Err(InferenceError::ConfigMismatch {
            field: stack,
            expected: layers.len(),
            actual: buffers.len(),
        });
    }
    for (layer, buffer) in layers.iter().zip(buffers) {
        expect_shape("model_workspace", buffer, (layer.output_size(), 1))?;
    }
    Ok(())
}

/// Checks that each layer consumes what the previous one produces, that the first
/// layer consumes `input_size` and that the last produces `output_size`.
pub(crate) fn check_chain(
    stack: &'static str,
    layers: &[DenseLayer],
    input_size: Option<usize>,
    output_size: Option<usize>,
) -> InferenceResult<()> {
    let mut received = input_size;
    for (index, layer) in layers.iter().enumerate() {
        if let Some(actual) = received {
            if layer.input_size() != actual {
                return Err(InferenceError::LayerSizeMismatch {
                    stack,
                    index,
                    expected: layer.input_size(),
                    actual,
                });
            }
        }
        received = Some(layer.output_size());
    }

    // The consumer after the stack is treated as layer `layers.len()`.
    if let (Some(expected), Some(actual)) = (output_size, received) {
        if expected != actual {
            return Err(InferenceError::LayerSizeMismatch {
                stack,
                index: layers.len(),
                expected,
                actual,
            });
        }
    }
    Ok(())
}

/// Checks a model's layers against the class, types and sizes declared in `config`.
pub(crate) fn check_config(
    config: &InferenceConfig,
    model_class: ModelClass,
    input_size: usize,
    cell: &CellParameters,
    output: &[DenseLayer],
) -> InferenceResult<()> {
    if config.model_class != model_class {
        return Err(InferenceError::ModelClassMismatch {
            expected: config.model_class,
            actual: model_class,
        });
    }
    if cell.cell_type() != config.cell_type {
        return Err(InferenceError::CellTypeMismatch {
            expected: config.cell_type,
            actual: cell.cell_type(),
        });
    }

    check_size("input_size", config.input_size, input_size)?;
    check_size("embedding_size", config.embedding_size, cell.input_size())?;
    check_size("state_size", config.state_size, cell.state_size())?;
    let hidden = output.split_last().map_or(&[][..], |(_, hidden)| hidden);
    check_size(
        "output_hidden_units",
        config.output_hidden_units.len(),
        hidden.len(),
    )?;
    for (&expected, layer) in config.output_hidden_units.iter().zip(hidden) {
        check_size("output_hidden_units", expected, layer.output_size())?;
    }
    let output_size = output.last().map(DenseLayer::output_size).unwrap_or_default();
    check_size("output_size", config.output_size, output_size)
}

pub(crate) fn check_size(field: &'static str, expected: usize, actual: usize) -> InferenceResult<()> {
    if expected != actual {
        return Err(InferenceError::ConfigMismatch {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}
