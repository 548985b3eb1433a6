//! Pre-allocated scratch buffers for the recurrent cells.
//!
//! A workspace is built once per cell and reused for every step, so a sequence
//! pass performs no allocation after setup.

use crate::errors::InferenceResult;
use crate::layers::CellType;
use crate::matrix::{Matrix, expect_shape};

/// Intermediate vectors of a [`crate::layers::GruParameters`] step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GruWorkspace {
    pub(crate) update: Matrix,
    /// Holds the reset gate, then `reset ⊙ state`.
    pub(crate) reset: Matrix,
    pub(crate) candidate: Matrix,
    pub(crate) input_update: Matrix,
    pub(crate) input_reset: Matrix,
    pub(crate) input_candidate: Matrix,
    pub(crate) gate_scratch: Matrix,
}

impl GruWorkspace {
    pub fn new(state_size: usize) -> InferenceResult<Self> {
        Ok(Self {
            update: Matrix::column(state_size)?,
            reset: Matrix::column(state_size)?,
            candidate: Matrix::column(state_size)?,
            input_update: Matrix::column(state_size)?,
            input_reset: Matrix::column(state_size)?,
            input_candidate: Matrix::column(state_size)?,
            gate_scratch: Matrix::column(state_size)?,
        })
    }

    pub(crate) fn check(&self, state_size: usize) -> InferenceResult<()> {
        let shape = (state_size, 1);
        for buffer in [
            &self.update,
            &self.reset,
            &self.candidate,
            &self.input_update,
            &self.input_reset,
            &self.input_candidate,
            &self.gate_scratch,
        ] {
            expect_shape("gru_workspace", buffer, shape)?;
        }
        Ok(())
    }
}

/// Intermediate vectors of a [`crate::layers::FusedGruParameters`] step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusedGruWorkspace {
    /// Holds `[input; state]`, then `[input; reset ⊙ state]`.
    pub(crate) stacked: Matrix,
    /// Reset rows first, update rows second.
    pub(crate) gates: Matrix,
    pub(crate) candidate: Matrix,
    pub(crate) update: Matrix,
    pub(crate) reset: Matrix,
    pub(crate) gate_scratch: Matrix,
}

impl FusedGruWorkspace {
    pub fn new(input_size: usize, state_size: usize) -> InferenceResult<Self> {
        Ok(Self {
            stacked: Matrix::column(input_size + state_size)?,
            gates: Matrix::column(2 * state_size)?,
            candidate: Matrix::column(state_size)?,
            update: Matrix::column(state_size)?,
            reset: Matrix::column(state_size)?,
            gate_scratch: Matrix::column(state_size)?,
        })
    }

    pub(crate) fn check(&self, input_size: usize, state_size: usize) -> InferenceResult<()> {
        expect_shape("fused_gru_workspace", &self.stacked, (input_size + state_size, 1))?;
        expect_shape("fused_gru_workspace", &self.gates, (2 * state_size, 1))?;
        for buffer in [
            &self.candidate,
            &self.update,
            &self.reset,
            &self.gate_scratch,
        ] {
            expect_shape("fused_gru_workspace", buffer, (state_size, 1))?;
        }
        Ok(())
    }
}

/// Workspace of either cell, matching [`crate::layers::CellParameters`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellWorkspace {
    Gru(GruWorkspace),
    FusedGru(FusedGruWorkspace),
}

impl CellWorkspace {
    pub fn cell_type(&self) -> CellType {
        match self {
            CellWorkspace::Gru(_) => CellType::Gru,
            CellWorkspace::FusedGru(_) => CellType::TfGru,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::InferenceError;

    #[test]
    fn test_gru_workspace_shapes() {
        let workspace = GruWorkspace::new(4).unwrap();
        assert!(workspace.check(4).is_ok());
        assert!(matches!(
            workspace.check(3),
            Err(InferenceError::ShapeMismatch {
                operation: "gru_workspace",
                expected: (3, 1),
                actual: (4, 1)
            })
        ));
    }

    #[test]
    fn test_fused_workspace_shapes() {
        let workspace = FusedGruWorkspace::new(2, 3).unwrap();
        assert_eq!(workspace.stacked.shape(), (5, 1));
        assert_eq!(workspace.gates.shape(), (6, 1));
        assert!(workspace.check(2, 3).is_ok());
        assert!(workspace.check(3, 3).is_err());
        assert_eq!(
            CellWorkspace::FusedGru(workspace).cell_type(),
            CellType::TfGru
        );
    }
}
