//! Error types for matrix, layer and model operations.

use thiserror::Error;

use crate::errors::FixedPointError;
use crate::layers::CellType;
use crate::sequence_model::ModelClass;

/// Errors that can occur while building or running a fixed-point computation.
///
/// Every shape check is performed before the destination matrix is written, so an
/// error leaves the destination exactly as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("Unable to allocate a {rows}x{cols} matrix")]
    AllocationFailed { rows: usize, cols: usize },

    #[error("Shape mismatch in {operation}: expected {expected:?} but got {actual:?}")]
    ShapeMismatch {
        operation: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error(
        "The columns of the left matrix must match the rows of the right matrix: {left_cols} != {right_rows}"
    )]
    InnerDimensionMismatch { left_cols: usize, right_rows: usize },

    #[error("Stacked matrices must have the same number of columns: {top_cols} != {bottom_cols}")]
    StackColumnMismatch { top_cols: usize, bottom_cols: usize },

    #[error(
        "Cannot split {source_rows} rows into {top_rows} and {bottom_rows} rows"
    )]
    SplitSizeMismatch {
        source_rows: usize,
        top_rows: usize,
        bottom_rows: usize,
    },

    #[error("Element ({row}, {col}) is outside a matrix of shape {shape:?}")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        shape: (usize, usize),
    },

    #[error("Expected {expected} elements but got {actual}")]
    ElementCountMismatch { expected: usize, actual: usize },

    #[error("The fused gate weights must have an even number of rows, got {rows}")]
    OddGateRows { rows: usize },

    #[error("Workspace was built for a {actual:?} cell but the cell is {expected:?}")]
    WorkspaceMismatch { expected: CellType, actual: CellType },

    #[error("Unknown cell type: {name}")]
    UnknownCellType { name: String },

    #[error("Unknown activation: {name}")]
    UnknownActivation { name: String },

    #[error("Unknown output type: {name}")]
    UnknownOutputType { name: String },

    #[error("Cell type mismatch: expected {expected:?} but got {actual:?}")]
    CellTypeMismatch { expected: CellType, actual: CellType },

    #[error("Model class mismatch: expected {expected:?} but got {actual:?}")]
    ModelClassMismatch {
        expected: ModelClass,
        actual: ModelClass,
    },

    #[error("Configuration mismatch on {field}: expected {expected} but got {actual}")]
    ConfigMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("The input sequence must contain at least one element")]
    EmptyInputSequence,

    #[error("The input sequence has {provided} elements but {requested} steps were requested")]
    SequenceTooShort { provided: usize, requested: usize },

    #[error("The input sequence has {length} elements, which is not a multiple of {num_levels} levels")]
    SequenceNotDivisible { length: usize, num_levels: usize },

    #[error("An adaptive model needs a threshold for at least one level")]
    NoLevels,

    #[error("The {stack} layer stack must contain at least one layer")]
    EmptyLayerStack { stack: &'static str },

    #[error(
        "Layer {index} of the {stack} stack expects {expected} inputs but receives {actual}"
    )]
    LayerSizeMismatch {
        stack: &'static str,
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Cannot take the argmax of an empty matrix")]
    EmptyMatrix,

    #[error(transparent)]
    Arithmetic(#[from] FixedPointError),
}
