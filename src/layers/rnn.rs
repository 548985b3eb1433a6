use log::{debug, trace};

use crate::errors::{InferenceError, InferenceResult};
use crate::fixed_point::Precision;
use crate::layers::{CellParameters, RecurrentCell};
use crate::matrix::{Matrix, expect_shape};

/// Summarizes the first `seq_length` inputs into a final state held in `dest`.
///
/// `dest` is zeroed and then threaded through `cell` once per input. Shapes and
/// precision are checked before `dest` is touched, so a failed call leaves it
/// unchanged. A `seq_length` of zero yields the zero state.
pub fn rnn<'d>(
    dest: &'d mut Matrix,
    inputs: &[Matrix],
    cell: &CellParameters,
    seq_length: usize,
    precision: Precision,
) -> InferenceResult<&'d mut Matrix> {
    let mut workspace = cell.workspace()?;
    rnn_with_workspace(dest, inputs, cell, &mut workspace, seq_length, precision)
}

/// [`rnn`] for any [`RecurrentCell`], reusing the buffers of `workspace`.
pub fn rnn_with_workspace<'d, C>(
    dest: &'d mut Matrix,
    inputs: &[Matrix],
    cell: &C,
    workspace: &mut C::Workspace,
    seq_length: usize,
    precision: Precision,
) -> InferenceResult<&'d mut Matrix>
where
    C: RecurrentCell + ?Sized,
{
    if inputs.len() < seq_length {
        return Err(InferenceError::SequenceTooShort {
            provided: inputs.len(),
            requested: seq_length,
        });
    }
    let sequence = &inputs[..seq_length];

    expect_shape("rnn", dest, (cell.state_size(), 1))?;
    for input in sequence {
        expect_shape("rnn", input, (cell.input_size(), 1))?;
    }
    cell.check_workspace(workspace)?;
    precision.require_nonlinear("rnn")?;

    debug!(
        "Running {} cell over {} steps ({} inputs -> {} states, {})",
        cell.cell_type().name(),
        seq_length,
        cell.input_size(),
        cell.state_size(),
        precision
    );

    dest.set(0);
    for (index, input) in sequence.iter().enumerate() {
        cell.step(dest, input, workspace, precision)?;
        trace!("State after step {}: {:?}", index + 1, dest.as_slice());
    }
    Ok(dest)
}
