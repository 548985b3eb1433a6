use crate::errors::InferenceResult;
use crate::fixed_point::{self, Precision};
use crate::matrix::{self, Matrix, expect_shape};

/// Convex blend `dest = gate ⊙ first + (1 - gate) ⊙ second`.
///
/// Gate values are expected in `[0, 1]` and are not checked. Allocates the
/// `(1 - gate) ⊙ second` scratch buffer for the duration of the call.
pub fn gate_blend<'d>(
    dest: &'d mut Matrix,
    gate: &Matrix,
    first: &Matrix,
    second: &Matrix,
    precision: Precision,
) -> InferenceResult<&'d mut Matrix> {
    let mut scratch = Matrix::allocate(gate.num_rows(), gate.num_cols())?;
    gate_blend_with_scratch(dest, gate, first, second, &mut scratch, precision)
}

/// [`gate_blend`] using a caller-provided scratch buffer shaped like `gate`.
pub fn gate_blend_with_scratch<'d>(
    dest: &'d mut Matrix,
    gate: &Matrix,
    first: &Matrix,
    second: &Matrix,
    scratch: &mut Matrix,
    precision: Precision,
) -> InferenceResult<&'d mut Matrix> {
    check_operands(gate, first, second, scratch)?;
    expect_shape("gate_blend", dest, gate.shape())?;

    opposite_gate_times(scratch, gate, second, precision)?;
    matrix::hadamard(dest, first, gate, precision)?;
    matrix::add_in_place(dest, scratch)
}

/// [`gate_blend_with_scratch`] with `first` doubling as the destination.
///
/// Each element of `first` is read before it is overwritten, so a state vector can
/// be blended with its own candidate without a second buffer.
pub fn gate_blend_in_place<'f>(
    first: &'f mut Matrix,
    gate: &Matrix,
    second: &Matrix,
    scratch: &mut Matrix,
    precision: Precision,
) -> InferenceResult<&'f mut Matrix> {
    check_operands(gate, first, second, scratch)?;

    opposite_gate_times(scratch, gate, second, precision)?;
    matrix::hadamard_in_place(first, gate, precision)?;
    matrix::add_in_place(first, scratch)
}

fn check_operands(
    gate: &Matrix,
    first: &Matrix,
    second: &Matrix,
    scratch: &Matrix,
) -> InferenceResult<()> {
    expect_shape("gate_blend", first, gate.shape())?;
    expect_shape("gate_blend", second, gate.shape())?;
    expect_shape("gate_blend", scratch, gate.shape())
}

/// `scratch = (1 - gate) ⊙ second`
fn opposite_gate_times(
    scratch: &mut Matrix,
    gate: &Matrix,
    second: &Matrix,
    precision: Precision,
) -> InferenceResult<()> {
    matrix::scalar_product(scratch, gate, fixed_point::from_int(-1, precision), precision)?;
    matrix::scalar_add_in_place(scratch, fixed_point::from_int(1, precision));
    matrix::hadamard_in_place(scratch, second, precision)?;
    Ok(())
}
