//! Multi-level sequence inference with early exit.
//!
//! An [`AdaptiveModel`] splits a sequence of `num_levels * samples` inputs into
//! `num_levels` interleaved subsequences: level `i` sees inputs `i`,
//! `i + num_levels`, `i + 2 * num_levels` and so on. Each level restarts the
//! recurrent cell from a zero state. From the second level on, before every
//! step the state is blended with the state the previous level reached at the
//! same sample, through a gate computed by a dense fusion layer over both states.
//!
//! After each level the output stack produces a prediction. A classification
//! level whose confidence reaches that level's threshold ends the computation;
//! otherwise the next level runs, and the last level always predicts.

use std::slice;

use log::{debug, trace};

use crate::config::InferenceConfig;
use crate::errors::{InferenceError, InferenceResult};
use crate::fixed_point::{self, FixedPoint, Precision};
use crate::layers::{self, CellParameters, DenseLayer, RecurrentCell};
use crate::matrix::{self, Matrix, expect_shape};
use crate::sequence_model::{
    ModelClass, OutputType, Prediction, PredictionValue, check_buffers, check_chain,
    check_config, check_size, first_output, layer_buffers, run_stack,
};
use crate::workspace::CellWorkspace;

/// Buffers for one prediction, sized for a particular [`AdaptiveModel`].
///
/// The per-sample states of the previous level are sized on first use and
/// reallocated only when the number of samples per level changes.
#[derive(Debug, Clone)]
pub struct AdaptiveWorkspace {
    embedding: Vec<Matrix>,
    state: Matrix,
    cell: CellWorkspace,
    fusion_stack: Matrix,
    fusion_gate: Matrix,
    gate_scratch: Matrix,
    previous_states: Vec<Matrix>,
    output: Vec<Matrix>,
}

/// A recurrent model that refines its prediction over several levels.
#[derive(Debug, Clone)]
pub struct AdaptiveModel {
    precision: Precision,
    embedding: Vec<DenseLayer>,
    cell: CellParameters,
    fusion: DenseLayer,
    output: Vec<DenseLayer>,
    output_type: OutputType,
    thresholds: Vec<FixedPoint>,
}

impl AdaptiveModel {
    /// Assembles a model with one confidence threshold per level.
    ///
    /// `fusion` maps the stacked `[state; previous_state]` column to a gate the
    /// size of the state. Thresholds are probabilities in `precision`; a level
    /// stops the computation when its confidence is at least its threshold, so a
    /// threshold above one never stops. The last level's threshold is unused.
    pub fn new(
        precision: Precision,
        embedding: Vec<DenseLayer>,
        cell: CellParameters,
        fusion: DenseLayer,
        output: Vec<DenseLayer>,
        output_type: OutputType,
        thresholds: Vec<FixedPoint>,
    ) -> InferenceResult<Self> {
        precision.require_nonlinear("adaptive_model")?;
        if thresholds.is_empty() {
            return Err(InferenceError::NoLevels);
        }
        if output.is_empty() {
            return Err(InferenceError::EmptyLayerStack { stack: "output" });
        }
        let state_size = cell.state_size();
        check_chain("embedding", &embedding, None, Some(cell.input_size()))?;
        check_chain(
            "fusion",
            slice::from_ref(&fusion),
            Some(2 * state_size),
            Some(state_size),
        )?;
        check_chain("output", &output, Some(state_size), None)?;

        Ok(Self {
            precision,
            embedding,
            cell,
            fusion,
            output,
            output_type,
            thresholds,
        })
    }

    /// Like [`AdaptiveModel::new`], additionally checking the layers against the
    /// sizes, types and level count declared in `config`.
    pub fn from_config(
        config: &InferenceConfig,
        embedding: Vec<DenseLayer>,
        cell: CellParameters,
        fusion: DenseLayer,
        output: Vec<DenseLayer>,
        thresholds: Vec<FixedPoint>,
    ) -> InferenceResult<Self> {
        let precision = Precision::new(config.precision)?;
        let model = Self::new(
            precision,
            embedding,
            cell,
            fusion,
            output,
            config.output_type,
            thresholds,
        )?;
        check_config(
            config,
            ModelClass::Adaptive,
            model.input_size(),
            &model.cell,
            &model.output,
        )?;
        check_size("num_levels", config.num_levels, model.num_levels())?;
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

    pub fn thresholds(&self) -> &[FixedPoint] {
        &self.thresholds
    }

    pub fn num_levels(&self) -> usize {
        self.thresholds.len()
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

    /// Allocates the buffers [`AdaptiveModel::predict_with_workspace`] needs.
    pub fn workspace(&self) -> InferenceResult<AdaptiveWorkspace> {
        let state_size = self.cell.state_size();
        Ok(AdaptiveWorkspace {
            embedding: layer_buffers(&self.embedding)?,
            state: Matrix::column(state_size)?,
            cell: self.cell.workspace()?,
            fusion_stack: Matrix::column(2 * state_size)?,
            fusion_gate: Matrix::column(state_size)?,
            gate_scratch: Matrix::column(state_size)?,
            previous_states: Vec::new(),
            output: layer_buffers(&self.output)?,
        })
    }

    /// Runs the model over `inputs`, whose length must be a multiple of the
    /// number of levels.
    pub fn predict(&self, inputs: &[Matrix]) -> InferenceResult<Prediction> {
        let mut workspace = self.workspace()?;
        self.predict_with_workspace(inputs, &mut workspace)
    }

    /// [`AdaptiveModel::predict`] reusing the buffers of `workspace`.
    pub fn predict_with_workspace(
        &self,
        inputs: &[Matrix],
        workspace: &mut AdaptiveWorkspace,
    ) -> InferenceResult<Prediction> {
        if inputs.is_empty() {
            return Err(InferenceError::EmptyInputSequence);
        }
        let num_levels = self.num_levels();
        if inputs.len() % num_levels != 0 {
            return Err(InferenceError::SequenceNotDivisible {
                length: inputs.len(),
                num_levels,
            });
        }
        for input in inputs {
            expect_shape("predict", input, (self.input_size(), 1))?;
        }
        self.check_workspace(workspace)?;

        let samples = inputs.len() / num_levels;
        let state_size = self.cell.state_size();
        if workspace.previous_states.len() != samples {
            workspace.previous_states = (0..samples)
                .map(|_| Matrix::column(state_size))
                .collect::<InferenceResult<_>>()?;
        }

        let AdaptiveWorkspace {
            embedding,
            state,
            cell,
            fusion_stack,
            fusion_gate,
            gate_scratch,
            previous_states,
            output,
        } = workspace;
        let precision = self.precision;

        debug!(
            "Predicting over {} levels of {} samples with a {} cell at {}",
            num_levels,
            samples,
            self.cell.cell_type().name(),
            precision
        );

        for (level, &threshold) in self.thresholds.iter().enumerate() {
            state.set(0);
            for (sample, previous) in previous_states.iter_mut().enumerate() {
                let input = &inputs[sample * num_levels + level];
                run_stack(&self.embedding, input, embedding, false, precision)?;
                let cell_input = embedding.last().unwrap_or(input);

                if level > 0 {
                    matrix::stack(fusion_stack, state, previous)?;
                    self.fusion.forward(fusion_gate, fusion_stack, precision)?;
                    layers::gate_blend_in_place(
                        state,
                        fusion_gate,
                        previous,
                        gate_scratch,
                        precision,
                    )?;
                }

                self.cell.step(state, cell_input, cell, precision)?;
                matrix::replace(previous, state)?;
            }
            trace!("State after level {}: {:?}", level + 1, state.as_slice());

            run_stack(&self.output, state, output, true, precision)?;
            if level + 1 < num_levels {
                let outputs = output
                    .last()
                    .ok_or(InferenceError::EmptyLayerStack { stack: "output" })?;
                if let Some(value) = self.confident_prediction(outputs, threshold)? {
                    debug!("Level {} is confident: {:?}", level + 1, value);
                    return Ok(Prediction {
                        value,
                        outputs: outputs.clone(),
                        num_levels: level + 1,
                        stopped_early: true,
                    });
                }
            }
        }

        let outputs = output
            .last()
            .ok_or(InferenceError::EmptyLayerStack { stack: "output" })?;
        let value = self.output_type.predict(outputs)?;
        debug!("Prediction after all {} levels: {:?}", num_levels, value);
        Ok(Prediction {
            value,
            outputs: outputs.clone(),
            num_levels,
            stopped_early: false,
        })
    }

    /// The level's prediction when its confidence reaches `threshold`.
    ///
    /// Multi-class confidence is the sigmoid of the largest output, binary
    /// confidence is the sigmoid probability of the predicted side. Regression
    /// has no confidence and never stops early.
    fn confident_prediction(
        &self,
        outputs: &Matrix,
        threshold: FixedPoint,
    ) -> InferenceResult<Option<PredictionValue>> {
        let precision = self.precision;
        let (value, confidence) = match self.output_type {
            OutputType::MultiClassification => {
                let class = matrix::argmax(outputs)?;
                let largest = outputs.as_slice()[class];
                (
                    PredictionValue::Class(class),
                    fixed_point::sigmoid(largest, precision)?,
                )
            }
            OutputType::BinaryClassification => {
                let logit = first_output(outputs)?;
                let probability = fixed_point::sigmoid(logit, precision)?;
                let confidence = probability.max(fixed_point::sub(precision.one(), probability));
                (PredictionValue::Binary(logit > 0), confidence)
            }
            OutputType::Regression => return Ok(None),
        };
        Ok((confidence >= threshold).then_some(value))
    }

    fn check_workspace(&self, workspace: &AdaptiveWorkspace) -> InferenceResult<()> {
        let state_size = self.cell.state_size();
        check_buffers("embedding", &self.embedding, &workspace.embedding)?;
        check_buffers("output", &self.output, &workspace.output)?;
        for buffer in [
            &workspace.state,
            &workspace.fusion_gate,
            &workspace.gate_scratch,
        ] {
            expect_shape("adaptive_workspace", buffer, (state_size, 1))?;
        }
        expect_shape(
            "adaptive_workspace",
            &workspace.fusion_stack,
            (2 * state_size, 1),
        )?;
        self.cell.check_workspace(&workspace.cell)
    }
}
