//! Fixed-shape 2D buffers of fixed-point values and the operations on them.
//!
//! Operations write into a caller-supplied destination whose shape must already be
//! correct; nothing is reallocated. The `*_in_place` variants use the destination
//! as the left operand, which is how a computation such as `x = x + b` is written
//! without aliasing a mutable and a shared borrow.
//!
//! Every operation validates all shapes before it writes, so a failed call leaves
//! the destination untouched.

use crate::activation::Activation;
use crate::errors::{InferenceError, InferenceResult};
use crate::fixed_point::{self, FixedPoint, Precision};

/// A row-major matrix of [`FixedPoint`] values.
///
/// The storage is released when the matrix is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    num_rows: usize,
    num_cols: usize,
    data: Vec<FixedPoint>,
}

impl Matrix {
    /// Allocates a zero-initialized matrix.
    pub fn allocate(num_rows: usize, num_cols: usize) -> InferenceResult<Self> {
        let failed = InferenceError::AllocationFailed {
            rows: num_rows,
            cols: num_cols,
        };
        let len = num_rows.checked_mul(num_cols).ok_or(failed.clone())?;

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| failed)?;
        data.resize(len, 0);

        Ok(Self {
            num_rows,
            num_cols,
            data,
        })
    }

    /// Allocates a zero-initialized column vector.
    pub fn column(num_rows: usize) -> InferenceResult<Self> {
        Self::allocate(num_rows, 1)
    }

    /// Wraps row-major values that are already in the target Q-format.
    pub fn from_data(
        num_rows: usize,
        num_cols: usize,
        data: Vec<FixedPoint>,
    ) -> InferenceResult<Self> {
        let expected = num_rows
            .checked_mul(num_cols)
            .ok_or(InferenceError::AllocationFailed {
                rows: num_rows,
                cols: num_cols,
            })?;
        if data.len() != expected {
            return Err(InferenceError::ElementCountMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            num_rows,
            num_cols,
            data,
        })
    }

    /// Quantizes row-major real values into the given Q-format.
    pub fn from_floats(
        num_rows: usize,
        num_cols: usize,
        values: &[f32],
        precision: Precision,
    ) -> InferenceResult<Self> {
        let data = values
            .iter()
            .map(|&value| fixed_point::from_float(value, precision))
            .collect();
        Self::from_data(num_rows, num_cols, data)
    }

    /// Returns the real values represented by this matrix.
    pub fn to_floats(&self, precision: Precision) -> Vec<f32> {
        self.data
            .iter()
            .map(|&value| fixed_point::to_float(value, precision))
            .collect()
    }

    /// Releases the matrix storage.
    pub fn release(self) {
        drop(self);
    }

    /// Fills every element with `value`.
    pub fn set(&mut self, value: FixedPoint) -> &mut Self {
        self.data.fill(value);
        self
    }

    /// Returns the element at (`row`, `col`).
    pub fn get(&self, row: usize, col: usize) -> Option<FixedPoint> {
        if row < self.num_rows && col < self.num_cols {
            Some(self.data[row * self.num_cols + col])
        } else {
            None
        }
    }

    /// Overwrites the element at (`row`, `col`).
    pub fn set_at(&mut self, row: usize, col: usize, value: FixedPoint) -> InferenceResult<()> {
        if row >= self.num_rows || col >= self.num_cols {
            return Err(InferenceError::IndexOutOfBounds {
                row,
                col,
                shape: self.shape(),
            });
        }
        self.data[row * self.num_cols + col] = value;
        Ok(())
    }

    /// Whether the matrix holds no elements. An empty bias is treated as absent.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline(always)]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[inline(always)]
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// Returns `(rows, cols)`.
    #[inline(always)]
    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows, self.num_cols)
    }

    /// Total number of elements.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[FixedPoint] {
        &self.data
    }

    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [FixedPoint] {
        &mut self.data
    }

    /// Consumes the matrix and returns its row-major storage.
    pub fn into_data(self) -> Vec<FixedPoint> {
        self.data
    }
}

/// Fails with [`InferenceError::ShapeMismatch`] unless `matrix` has `expected` shape.
pub(crate) fn expect_shape(
    operation: &'static str,
    matrix: &Matrix,
    expected: (usize, usize),
) -> InferenceResult<()> {
    if matrix.shape() != expected {
        return Err(InferenceError::ShapeMismatch {
            operation,
            expected,
            actual: matrix.shape(),
        });
    }
    Ok(())
}

/// Matrix product `dest = a · b`.
///
/// Each element accumulates `mul(a[i][k], b[k][j])` with wrapping `add`, so
/// truncation error compounds over the inner dimension.
pub fn multiply<'d>(
    dest: &'d mut Matrix,
    a: &Matrix,
    b: &Matrix,
    precision: Precision,
) -> InferenceResult<&'d mut Matrix> {
    if a.num_cols != b.num_rows {
        return Err(InferenceError::InnerDimensionMismatch {
            left_cols: a.num_cols,
            right_rows: b.num_rows,
        });
    }
    expect_shape("multiply", dest, (a.num_rows, b.num_cols))?;

    let inner = a.num_cols;
    let out_cols = b.num_cols;
    for row in 0..a.num_rows {
        let a_row = &a.data[row * inner..(row + 1) * inner];
        for col in 0..out_cols {
            let mut sum: FixedPoint = 0;
            for (k, &a_value) in a_row.iter().enumerate() {
                let b_value = b.data[k * out_cols + col];
                sum = fixed_point::add(sum, fixed_point::mul(a_value, b_value, precision));
            }
            dest.data[row * out_cols + col] = sum;
        }
    }
    Ok(dest)
}

/// Elementwise sum `dest = a + b`.
pub fn add<'d>(dest: &'d mut Matrix, a: &Matrix, b: &Matrix) -> InferenceResult<&'d mut Matrix> {
    expect_shape("add", b, a.shape())?;
    expect_shape("add", dest, a.shape())?;
    for ((out, &x), &y) in dest.data.iter_mut().zip(&a.data).zip(&b.data) {
        *out = fixed_point::add(x, y);
    }
    Ok(dest)
}

/// Elementwise sum `dest = dest + other`.
pub fn add_in_place<'d>(dest: &'d mut Matrix, other: &Matrix) -> InferenceResult<&'d mut Matrix> {
    expect_shape("add", other, dest.shape())?;
    for (out, &y) in dest.data.iter_mut().zip(&other.data) {
        *out = fixed_point::add(*out, y);
    }
    Ok(dest)
}

/// Elementwise product `dest = a ⊙ b`.
pub fn hadamard<'d>(
    dest: &'d mut Matrix,
    a: &Matrix,
    b: &Matrix,
    precision: Precision,
) -> InferenceResult<&'d mut Matrix> {
    expect_shape("hadamard", b, a.shape())?;
    expect_shape("hadamard", dest, a.shape())?;
    for ((out, &x), &y) in dest.data.iter_mut().zip(&a.data).zip(&b.data) {
        *out = fixed_point::mul(x, y, precision);
    }
    Ok(dest)
}

/// Elementwise product `dest = other ⊙ dest`.
pub fn hadamard_in_place<'d>(
    dest: &'d mut Matrix,
    other: &Matrix,
    precision: Precision,
) -> InferenceResult<&'d mut Matrix> {
    expect_shape("hadamard", other, dest.shape())?;
    for (out, &x) in dest.data.iter_mut().zip(&other.data) {
        *out = fixed_point::mul(x, *out, precision);
    }
    Ok(dest)
}

/// Broadcast sum `dest = a + scalar`.
pub fn scalar_add<'d>(
    dest: &'d mut Matrix,
    a: &Matrix,
    scalar: FixedPoint,
) -> InferenceResult<&'d mut Matrix> {
    expect_shape("scalar_add", dest, a.shape())?;
    for (out, &x) in dest.data.iter_mut().zip(&a.data) {
        *out = fixed_point::add(x, scalar);
    }
    Ok(dest)
}

/// Broadcast sum `dest = dest + scalar`.
pub fn scalar_add_in_place(dest: &mut Matrix, scalar: FixedPoint) -> &mut Matrix {
    for out in dest.data.iter_mut() {
        *out = fixed_point::add(*out, scalar);
    }
    dest
}

/// Broadcast product `dest = a * scalar`.
pub fn scalar_product<'d>(
    dest: &'d mut Matrix,
    a: &Matrix,
    scalar: FixedPoint,
    precision: Precision,
) -> InferenceResult<&'d mut Matrix> {
    expect_shape("scalar_product", dest, a.shape())?;
    for (out, &x) in dest.data.iter_mut().zip(&a.data) {
        *out = fixed_point::mul(x, scalar, precision);
    }
    Ok(dest)
}

/// Broadcast product `dest = dest * scalar`.
pub fn scalar_product_in_place(
    dest: &mut Matrix,
    scalar: FixedPoint,
    precision: Precision,
) -> &mut Matrix {
    for out in dest.data.iter_mut() {
        *out = fixed_point::mul(*out, scalar, precision);
    }
    dest
}

/// Maps `activation` over every element of `a` into `dest`.
///
/// The precision is checked against the activation before `dest` is touched, so an
/// unsupported format leaves it unchanged as well.
pub fn apply_elementwise<'d>(
    dest: &'d mut Matrix,
    a: &Matrix,
    activation: Activation,
    precision: Precision,
) -> InferenceResult<&'d mut Matrix> {
    expect_shape("apply_elementwise", dest, a.shape())?;
    activation.check_precision(precision)?;
    for (out, &x) in dest.data.iter_mut().zip(&a.data) {
        *out = activation.apply_single(x, precision)?;
    }
    Ok(dest)
}

/// Maps `activation` over every element of `dest`.
pub fn apply_elementwise_in_place(
    dest: &mut Matrix,
    activation: Activation,
    precision: Precision,
) -> InferenceResult<&mut Matrix> {
    activation.apply_in_place(&mut dest.data, precision)?;
    Ok(dest)
}

/// Vertical concatenation: `top`'s rows followed by `bottom`'s rows.
pub fn stack<'d>(
    dest: &'d mut Matrix,
    top: &Matrix,
    bottom: &Matrix,
) -> InferenceResult<&'d mut Matrix> {
    if top.num_cols != bottom.num_cols {
        return Err(InferenceError::StackColumnMismatch {
            top_cols: top.num_cols,
            bottom_cols: bottom.num_cols,
        });
    }
    expect_shape("stack", dest, (top.num_rows + bottom.num_rows, top.num_cols))?;

    let (head, tail) = dest.data.split_at_mut(top.data.len());
    head.copy_from_slice(&top.data);
    tail.copy_from_slice(&bottom.data);
    Ok(dest)
}

/// Inverse of [`stack`]: copies the first `top.num_rows()` rows of `source` into
/// `top` and the remaining rows into `bottom`.
pub fn split(source: &Matrix, top: &mut Matrix, bottom: &mut Matrix) -> InferenceResult<()> {
    if top.num_rows + bottom.num_rows != source.num_rows {
        return Err(InferenceError::SplitSizeMismatch {
            source_rows: source.num_rows,
            top_rows: top.num_rows,
            bottom_rows: bottom.num_rows,
        });
    }
    expect_shape("split", top, (top.num_rows, source.num_cols))?;
    expect_shape("split", bottom, (bottom.num_rows, source.num_cols))?;

    let (head, tail) = source.data.split_at(top.data.len());
    top.data.copy_from_slice(head);
    bottom.data.copy_from_slice(tail);
    Ok(())
}

/// Copies the contents of `source` into the equally-shaped `dest`.
pub fn replace<'d>(dest: &'d mut Matrix, source: &Matrix) -> InferenceResult<&'d mut Matrix> {
    expect_shape("replace", dest, source.shape())?;
    dest.data.copy_from_slice(&source.data);
    Ok(dest)
}

/// Rescales every element of `source` between Q-formats.
pub fn convert<'d>(
    dest: &'d mut Matrix,
    source: &Matrix,
    old_precision: Precision,
    new_precision: Precision,
) -> InferenceResult<&'d mut Matrix> {
    expect_shape("convert", dest, source.shape())?;
    for (out, &x) in dest.data.iter_mut().zip(&source.data) {
        *out = fixed_point::convert(x, old_precision, new_precision);
    }
    Ok(dest)
}

/// Row-major index of the largest element. Ties resolve to the first occurrence.
pub fn argmax(matrix: &Matrix) -> InferenceResult<usize> {
    let mut best: Option<(usize, FixedPoint)> = None;
    for (index, &value) in matrix.data.iter().enumerate() {
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index).ok_or(InferenceError::EmptyMatrix)
}
