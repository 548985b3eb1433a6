use crate::activation::Activation;
use crate::errors::InferenceResult;
use crate::fixed_point::Precision;
use crate::layers::gate::{gate_blend_in_place, gate_blend_with_scratch};
use crate::layers::{CellType, RecurrentCell};
use crate::matrix::{self, Matrix, expect_shape};
use crate::workspace::GruWorkspace;

/// Weights of one GRU gate: `w` acts on the state, `u` on the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateWeights {
    pub w: Matrix,
    pub u: Matrix,
    pub b: Matrix,
}

impl GateWeights {
    pub fn new(w: Matrix, u: Matrix, b: Matrix) -> Self {
        Self { w, u, b }
    }
}

/// Parameters of a GRU cell with separate update, reset and candidate weights.
///
/// For state size `S` and input size `D`, every `w` is `S x S`, every `u` is
/// `S x D` and every `b` is `S x 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GruParameters {
    update: GateWeights,
    reset: GateWeights,
    candidate: GateWeights,
}

impl GruParameters {
    /// Validates that all nine matrices agree on the state and input sizes, which
    /// are taken from `update`.
    pub fn new(
        update: GateWeights,
        reset: GateWeights,
        candidate: GateWeights,
    ) -> InferenceResult<Self> {
        let state_size = update.w.num_rows();
        let input_size = update.u.num_cols();
        for gate in [&update, &reset, &candidate] {
            expect_shape("gru_parameters", &gate.w, (state_size, state_size))?;
            expect_shape("gru_parameters", &gate.u, (state_size, input_size))?;
            expect_shape("gru_parameters", &gate.b, (state_size, 1))?;
        }
        Ok(Self {
            update,
            reset,
            candidate,
        })
    }

    pub fn update(&self) -> &GateWeights {
        &self.update
    }

    pub fn reset(&self) -> &GateWeights {
        &self.reset
    }

    pub fn candidate(&self) -> &GateWeights {
        &self.candidate
    }

    fn check_operands(
        &self,
        input: &Matrix,
        state: &Matrix,
        workspace: &GruWorkspace,
        precision: Precision,
    ) -> InferenceResult<()> {
        expect_shape("gru_cell", input, (self.input_size(), 1))?;
        expect_shape("gru_cell", state, (self.state_size(), 1))?;
        workspace.check(self.state_size())?;
        precision.require_nonlinear("gru_cell")?;
        Ok(())
    }

    /// Fills `workspace.update` and `workspace.candidate`.
    fn compute_gates(
        &self,
        input: &Matrix,
        state: &Matrix,
        workspace: &mut GruWorkspace,
        precision: Precision,
    ) -> InferenceResult<()> {
        let GruWorkspace {
            update,
            reset,
            candidate,
            input_update,
            input_reset,
            input_candidate,
            ..
        } = workspace;

        // update = sigmoid(W_u · state + U_u · input + b_u)
        matrix::multiply(input_update, &self.update.u, input, precision)?;
        matrix::multiply(update, &self.update.w, state, precision)?;
        matrix::add_in_place(update, input_update)?;
        matrix::add_in_place(update, &self.update.b)?;
        matrix::apply_elementwise_in_place(update, Activation::Sigmoid, precision)?;

        // reset = sigmoid(W_r · state + U_r · input + b_r) ⊙ state
        matrix::multiply(input_reset, &self.reset.u, input, precision)?;
        matrix::multiply(reset, &self.reset.w, state, precision)?;
        matrix::add_in_place(reset, input_reset)?;
        matrix::add_in_place(reset, &self.reset.b)?;
        matrix::apply_elementwise_in_place(reset, Activation::Sigmoid, precision)?;
        matrix::hadamard_in_place(reset, state, precision)?;

        // candidate = tanh(W_c · reset + U_c · input + b_c)
        matrix::multiply(input_candidate, &self.candidate.u, input, precision)?;
        matrix::multiply(candidate, &self.candidate.w, reset, precision)?;
        matrix::add_in_place(candidate, input_candidate)?;
        matrix::add_in_place(candidate, &self.candidate.b)?;
        matrix::apply_elementwise_in_place(candidate, Activation::Tanh, precision)?;
        Ok(())
    }
}

impl RecurrentCell for GruParameters {
    type Workspace = GruWorkspace;

    fn cell_type(&self) -> CellType {
        CellType::Gru
    }

    fn input_size(&self) -> usize {
        self.update.u.num_cols()
    }

    fn state_size(&self) -> usize {
        self.update.w.num_rows()
    }

    fn workspace(&self) -> InferenceResult<GruWorkspace> {
        GruWorkspace::new(self.state_size())
    }

    fn check_workspace(&self, workspace: &GruWorkspace) -> InferenceResult<()> {
        workspace.check(self.state_size())
    }

    fn step(
        &self,
        state: &mut Matrix,
        input: &Matrix,
        workspace: &mut GruWorkspace,
        precision: Precision,
    ) -> InferenceResult<()> {
        self.check_operands(input, state, workspace, precision)?;
        self.compute_gates(input, state, workspace, precision)?;
        gate_blend_in_place(
            state,
            &workspace.update,
            &workspace.candidate,
            &mut workspace.gate_scratch,
            precision,
        )?;
        Ok(())
    }
}

/// One GRU step: `dest = update ⊙ state + (1 - update) ⊙ candidate`.
///
/// Allocates the intermediate vectors for the duration of the call.
pub fn gru_cell<'d>(
    dest: &'d mut Matrix,
    input: &Matrix,
    state: &Matrix,
    parameters: &GruParameters,
    precision: Precision,
) -> InferenceResult<&'d mut Matrix> {
    let mut workspace = parameters.workspace()?;
    gru_cell_with_workspace(dest, input, state, parameters, &mut workspace, precision)
}

/// [`gru_cell`] reusing the buffers of `workspace`.
pub fn gru_cell_with_workspace<'d>(
    dest: &'d mut Matrix,
    input: &Matrix,
    state: &Matrix,
    parameters: &GruParameters,
    workspace: &mut GruWorkspace,
    precision: Precision,
) -> InferenceResult<&'d mut Matrix> {
    parameters.check_operands(input, state, workspace, precision)?;
    expect_shape("gru_cell", dest, state.shape())?;

    parameters.compute_gates(input, state, workspace, precision)?;
    gate_blend_with_scratch(
        dest,
        &workspace.update,
        state,
        &workspace.candidate,
        &mut workspace.gate_scratch,
        precision,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::InferenceError;

    fn q8() -> Precision {
        Precision::new(8).unwrap()
    }

    fn scalar(value: i16) -> Matrix {
        Matrix::from_data(1, 1, vec![value]).unwrap()
    }

    /// One-unit cell whose weights are all zero and whose candidate bias is one.
    fn bias_only_cell() -> GruParameters {
        GruParameters::new(
            GateWeights::new(scalar(0), scalar(0), scalar(0)),
            GateWeights::new(scalar(0), scalar(0), scalar(0)),
            GateWeights::new(scalar(0), scalar(0), scalar(256)),
        )
        .unwrap()
    }

    #[test]
    fn test_bias_only_step() {
        // update = sigmoid(0) = 0.5, candidate = tanh(1) = 192
        let mut dest = Matrix::column(1).unwrap();
        gru_cell(&mut dest, &scalar(100), &scalar(0), &bias_only_cell(), q8()).unwrap();
        assert_eq!(dest.as_slice(), &[96]);

        let state = dest.clone();
        gru_cell(&mut dest, &scalar(100), &state, &bias_only_cell(), q8()).unwrap();
        assert_eq!(dest.as_slice(), &[144]);
    }

    #[test]
    fn test_step_matches_gru_cell() {
        let cell = GruParameters::new(
            GateWeights::new(scalar(40), scalar(-70), scalar(10)),
            GateWeights::new(scalar(-90), scalar(120), scalar(-5)),
            GateWeights::new(scalar(200), scalar(60), scalar(30)),
        )
        .unwrap();
        let input = scalar(180);
        let state = scalar(-77);

        let mut expected = Matrix::column(1).unwrap();
        gru_cell(&mut expected, &input, &state, &cell, q8()).unwrap();

        let mut in_place = state.clone();
        let mut workspace = cell.workspace().unwrap();
        cell.step(&mut in_place, &input, &mut workspace, q8()).unwrap();
        assert_eq!(in_place, expected);
    }

    #[test]
    fn test_parameters_reject_inconsistent_shapes() {
        let result = GruParameters::new(
            GateWeights::new(scalar(0), scalar(0), scalar(0)),
            GateWeights::new(Matrix::allocate(2, 2).unwrap(), scalar(0), scalar(0)),
            GateWeights::new(scalar(0), scalar(0), scalar(0)),
        );
        assert!(matches!(
            result,
            Err(InferenceError::ShapeMismatch {
                operation: "gru_parameters",
                ..
            })
        ));
    }

    #[test]
    fn test_input_shape_is_checked() {
        let mut dest = scalar(5);
        let result = gru_cell(
            &mut dest,
            &Matrix::column(2).unwrap(),
            &scalar(0),
            &bias_only_cell(),
            q8(),
        );
        assert!(result.is_err());
        assert_eq!(dest.as_slice(), &[5]);
    }
}
