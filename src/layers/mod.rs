//! Layer forward passes composed from matrix operations.
//!
//! The recurrent cells share the [`RecurrentCell`] trait so the sequence driver in
//! [`rnn`] can fold a sequence through either of them, or through the
//! [`CellParameters`] sum type when the cell is only known at runtime.

pub mod dense;
pub mod fused_gru_cell;
pub mod gate;
pub mod gru_cell;
pub mod rnn;

pub use dense::{DenseLayer, dense};
pub use fused_gru_cell::{FusedGruParameters, fused_gru_cell, fused_gru_cell_with_workspace};
pub use gate::{gate_blend, gate_blend_in_place, gate_blend_with_scratch};
pub use gru_cell::{GateWeights, GruParameters, gru_cell, gru_cell_with_workspace};
pub use rnn::{rnn, rnn_with_workspace};

use serde::{Deserialize, Serialize};

use crate::errors::{InferenceError, InferenceResult};
use crate::fixed_point::Precision;
use crate::matrix::Matrix;
use crate::workspace::CellWorkspace;

/// The recurrent cell variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CellType {
    /// Six matrix multiplies, one per gate and operand.
    #[default]
    #[serde(rename = "GRU")]
    Gru,
    /// Reset and update gates fused into one multiply over `[input; state]`.
    #[serde(rename = "TFGRU")]
    TfGru,
}

impl CellType {
    /// Get cell type by string name.
    pub fn get_by_name(type_name: &str) -> Option<Self> {
        match type_name {
            "GRU" => Some(CellType::Gru),
            "TFGRU" => Some(CellType::TfGru),
            _ => None,
        }
    }

    /// Like [`CellType::get_by_name`], but reports an unknown name as an error.
    pub fn from_name(type_name: &str) -> InferenceResult<Self> {
        Self::get_by_name(type_name).ok_or_else(|| InferenceError::UnknownCellType {
            name: type_name.to_string(),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            CellType::Gru => "GRU",
            CellType::TfGru => "TFGRU",
        }
    }
}

/// A recurrent cell that folds one input vector into a state vector.
pub trait RecurrentCell {
    /// Scratch buffers a single step needs.
    type Workspace;

    fn cell_type(&self) -> CellType;

    /// Rows of the input column vector.
    fn input_size(&self) -> usize;

    /// Rows of the state column vector.
    fn state_size(&self) -> usize;

    /// Allocates the scratch buffers for one step.
    fn workspace(&self) -> InferenceResult<Self::Workspace>;

    /// Fails unless `workspace` was built for a cell of this kind and size.
    fn check_workspace(&self, workspace: &Self::Workspace) -> InferenceResult<()>;

    /// Replaces `state` with the cell output for `input`.
    ///
    /// All operands are validated before `state` is written.
    fn step(
        &self,
        state: &mut Matrix,
        input: &Matrix,
        workspace: &mut Self::Workspace,
        precision: Precision,
    ) -> InferenceResult<()>;
}

/// Parameters of either recurrent cell, tagged by the cell they drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellParameters {
    Gru(GruParameters),
    FusedGru(FusedGruParameters),
}

impl From<GruParameters> for CellParameters {
    fn from(parameters: GruParameters) -> Self {
        CellParameters::Gru(parameters)
    }
}

impl From<FusedGruParameters> for CellParameters {
    fn from(parameters: FusedGruParameters) -> Self {
        CellParameters::FusedGru(parameters)
    }
}

impl RecurrentCell for CellParameters {
    type Workspace = CellWorkspace;

    fn cell_type(&self) -> CellType {
        match self {
            CellParameters::Gru(cell) => cell.cell_type(),
            CellParameters::FusedGru(cell) => cell.cell_type(),
        }
    }

    fn input_size(&self) -> usize {
        match self {
            CellParameters::Gru(cell) => cell.input_size(),
            CellParameters::FusedGru(cell) => cell.input_size(),
        }
    }

    fn state_size(&self) -> usize {
        match self {
            CellParameters::Gru(cell) => cell.state_size(),
            CellParameters::FusedGru(cell) => cell.state_size(),
        }
    }

    fn workspace(&self) -> InferenceResult<CellWorkspace> {
        Ok(match self {
            CellParameters::Gru(cell) => CellWorkspace::Gru(cell.workspace()?),
            CellParameters::FusedGru(cell) => CellWorkspace::FusedGru(cell.workspace()?),
        })
    }

    fn check_workspace(&self, workspace: &CellWorkspace) -> InferenceResult<()> {
        match (self, workspace) {
            (CellParameters::Gru(cell), CellWorkspace::Gru(workspace)) => {
                cell.check_workspace(workspace)
            }
            (CellParameters::FusedGru(cell), CellWorkspace::FusedGru(workspace)) => {
                cell.check_workspace(workspace)
            }
            _ => Err(InferenceError::WorkspaceMismatch {
                expected: self.cell_type(),
                actual: workspace.cell_type(),
            }),
        }
    }

    fn step(
        &self,
        state: &mut Matrix,
        input: &Matrix,
        workspace: &mut CellWorkspace,
        precision: Precision,
    ) -> InferenceResult<()> {
        match (self, workspace) {
            (CellParameters::Gru(cell), CellWorkspace::Gru(workspace)) => {
                cell.step(state, input, workspace, precision)
            }
            (CellParameters::FusedGru(cell), CellWorkspace::FusedGru(workspace)) => {
                cell.step(state, input, workspace, precision)
            }
            (_, workspace) => Err(InferenceError::WorkspaceMismatch {
                expected: self.cell_type(),
                actual: workspace.cell_type(),
            }),
        }
    }
}
