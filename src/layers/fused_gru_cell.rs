use crate::activation::Activation;
use crate::errors::{InferenceError, InferenceResult};
use crate::fixed_point::Precision;
use crate::layers::gate::{gate_blend_in_place, gate_blend_with_scratch};
use crate::layers::{CellType, RecurrentCell};
use crate::matrix::{self, Matrix, expect_shape};
use crate::workspace::FusedGruWorkspace;

/// Parameters of a GRU cell whose reset and update gates share one multiply.
///
/// For state size `S` and input size `D`: `w_gates` is `2S x (D + S)` with the
/// reset rows first, `b_gates` is `2S x 1`, `w_candidates` is `S x (D + S)` and
/// `b_candidates` is `S x 1`. The input columns come before the state columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusedGruParameters {
    w_gates: Matrix,
    b_gates: Matrix,
    w_candidates: Matrix,
    b_candidates: Matrix,
}

impl FusedGruParameters {
    pub fn new(
        w_gates: Matrix,
        b_gates: Matrix,
        w_candidates: Matrix,
        b_candidates: Matrix,
    ) -> InferenceResult<Self> {
        if w_gates.num_rows() % 2 != 0 {
            return Err(InferenceError::OddGateRows {
                rows: w_gates.num_rows(),
            });
        }
        let state_size = w_gates.num_rows() / 2;
        if w_gates.num_cols() < state_size {
            return Err(InferenceError::ShapeMismatch {
                operation: "fused_gru_parameters",
                expected: (w_gates.num_rows(), state_size),
                actual: w_gates.shape(),
            });
        }
        let stacked_size = w_gates.num_cols();

        expect_shape("fused_gru_parameters", &b_gates, (2 * state_size, 1))?;
        expect_shape(
            "fused_gru_parameters",
            &w_candidates,
            (state_size, stacked_size),
        )?;
        expect_shape("fused_gru_parameters", &b_candidates, (state_size, 1))?;

        Ok(Self {
            w_gates,
            b_gates,
            w_candidates,
            b_candidates,
        })
    }

    pub fn w_gates(&self) -> &Matrix {
        &self.w_gates
    }

    pub fn b_gates(&self) -> &Matrix {
        &self.b_gates
    }

    pub fn w_candidates(&self) -> &Matrix {
        &self.w_candidates
    }

    pub fn b_candidates(&self) -> &Matrix {
        &self.b_candidates
    }

    fn check_operands(
        &self,
        input: &Matrix,
        state: &Matrix,
        workspace: &FusedGruWorkspace,
        precision: Precision,
    ) -> InferenceResult<()> {
        expect_shape("fused_gru_cell", input, (self.input_size(), 1))?;
        expect_shape("fused_gru_cell", state, (self.state_size(), 1))?;
        workspace.check(self.input_size(), self.state_size())?;
        precision.require_nonlinear("fused_gru_cell")?;
        Ok(())
    }

    /// Fills `workspace.update` and `workspace.candidate`.
    fn compute_gates(
        &self,
        input: &Matrix,
        state: &Matrix,
        workspace: &mut FusedGruWorkspace,
        precision: Precision,
    ) -> InferenceResult<()> {
        let FusedGruWorkspace {
            stacked,
            gates,
            candidate,
            update,
            reset,
            ..
        } = workspace;

        matrix::stack(stacked, input, state)?;
        matrix::multiply(gates, &self.w_gates, stacked, precision)?;
        matrix::add_in_place(gates, &self.b_gates)?;
        matrix::apply_elementwise_in_place(gates, Activation::Sigmoid, precision)?;
        matrix::split(gates, reset, update)?;

        matrix::hadamard_in_place(reset, state, precision)?;
        matrix::stack(stacked, input, reset)?;
        matrix::multiply(candidate, &self.w_candidates, stacked, precision)?;
        matrix::add_in_place(candidate, &self.b_candidates)?;
        matrix::apply_elementwise_in_place(candidate, Activation::Tanh, precision)?;
        Ok(())
    }
}

impl RecurrentCell for FusedGruParameters {
    type Workspace = FusedGruWorkspace;

    fn cell_type(&self) -> CellType {
        CellType::TfGru
    }

    fn input_size(&self) -> usize {
        self.w_gates.num_cols() - self.state_size()
    }

    fn state_size(&self) -> usize {
        self.w_gates.num_rows() / 2
    }

    fn workspace(&self) -> InferenceResult<FusedGruWorkspace> {
        FusedGruWorkspace::new(self.input_size(), self.state_size())
    }

    fn check_workspace(&self, workspace: &FusedGruWorkspace) -> InferenceResult<()> {
        workspace.check(self.input_size(), self.state_size())
    }

    fn step(
        &self,
        state: &mut Matrix,
        input: &Matrix,
        workspace: &mut FusedGruWorkspace,
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

/// One fused-gate GRU step.
///
/// `[input; state]` goes through `w_gates` once to produce both gates, then
/// `[input; reset ⊙ state]` through `w_candidates` to produce the candidate. The
/// new state is `update ⊙ state + (1 - update) ⊙ candidate`. Allocates the
/// intermediate vectors for the duration of the call.
pub fn fused_gru_cell<'d>(
    dest: &'d mut Matrix,
    input: &Matrix,
    state: &Matrix,
    parameters: &FusedGruParameters,
    precision: Precision,
) -> InferenceResult<&'d mut Matrix> {
    let mut workspace = parameters.workspace()?;
    fused_gru_cell_with_workspace(dest, input, state, parameters, &mut workspace, precision)
}

/// [`fused_gru_cell`] reusing the buffers of `workspace`.
pub fn fused_gru_cell_with_workspace<'d>(
    dest: &'d mut Matrix,
    input: &Matrix,
    state: &Matrix,
    parameters: &FusedGruParameters,
    workspace: &mut FusedGruWorkspace,
    precision: Precision,
) -> InferenceResult<&'d mut Matrix> {
    parameters.check_operands(input, state, workspace, precision)?;
    expect_shape("fused_gru_cell", dest, state.shape())?;

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
