use crate::activation::Activation;
use crate::errors::{InferenceError, InferenceResult};
use crate::fixed_point::Precision;
use crate::matrix::{self, Matrix, expect_shape};

/// Fully connected layer: `dest = activation(weights · input + bias)`.
///
/// A missing or empty `bias` skips the addition. Shapes and the activation's
/// precision requirements are checked before `dest` is written.
pub fn dense<'d>(
    dest: &'d mut Matrix,
    input: &Matrix,
    weights: &Matrix,
    bias: Option<&Matrix>,
    activation: Activation,
    precision: Precision,
) -> InferenceResult<&'d mut Matrix> {
    if weights.num_cols() != input.num_rows() {
        return Err(InferenceError::InnerDimensionMismatch {
            left_cols: weights.num_cols(),
            right_rows: input.num_rows(),
        });
    }
    let output_shape = (weights.num_rows(), input.num_cols());
    expect_shape("dense", dest, output_shape)?;

    let bias = bias.filter(|bias| !bias.is_empty());
    if let Some(bias) = bias {
        expect_shape("dense", bias, output_shape)?;
    }
    if activation != Activation::Linear {
        precision.require_nonlinear("dense")?;
    }

    matrix::multiply(dest, weights, input, precision)?;
    if let Some(bias) = bias {
        matrix::add_in_place(dest, bias)?;
    }
    matrix::apply_elementwise_in_place(dest, activation, precision)
}

/// A dense layer with its parameters, as stored in a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseLayer {
    weights: Matrix,
    bias: Option<Matrix>,
    activation: Activation,
}

impl DenseLayer {
    /// `weights` maps `weights.num_cols()` inputs to `weights.num_rows()` outputs.
    /// An empty `bias` is treated as absent.
    pub fn new(
        weights: Matrix,
        bias: Option<Matrix>,
        activation: Activation,
    ) -> InferenceResult<Self> {
        let bias = bias.filter(|bias| !bias.is_empty());
        if let Some(bias) = &bias {
            expect_shape("dense_layer", bias, (weights.num_rows(), 1))?;
        }
        Ok(Self {
            weights,
            bias,
            activation,
        })
    }

    pub fn input_size(&self) -> usize {
        self.weights.num_cols()
    }

    pub fn output_size(&self) -> usize {
        self.weights.num_rows()
    }

    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    pub fn bias(&self) -> Option<&Matrix> {
        self.bias.as_ref()
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Runs the layer with its own activation.
    pub fn forward<'d>(
        &self,
        dest: &'d mut Matrix,
        input: &Matrix,
        precision: Precision,
    ) -> InferenceResult<&'d mut Matrix> {
        self.forward_with(dest, input, self.activation, precision)
    }

    /// Runs the layer with `activation` in place of its own.
    pub fn forward_with<'d>(
        &self,
        dest: &'d mut Matrix,
        input: &Matrix,
        activation: Activation,
        precision: Precision,
    ) -> InferenceResult<&'d mut Matrix> {
        dense(
            dest,
            input,
            &self.weights,
            self.bias.as_ref(),
            activation,
            precision,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q3() -> Precision {
        Precision::new(3).unwrap()
    }

    fn weights() -> Matrix {
        // [[1, 2], [-1, 0.5]] at Q3
        Matrix::from_data(2, 2, vec![8, 16, -8, 4]).unwrap()
    }

    #[test]
    fn test_dense_linear_with_bias() {
        let input = Matrix::from_data(2, 1, vec![8, 8]).unwrap();
        let bias = Matrix::from_data(2, 1, vec![0, 8]).unwrap();
        let mut dest = Matrix::column(2).unwrap();
        dense(
            &mut dest,
            &input,
            &weights(),
            Some(&bias),
            Activation::Linear,
            q3(),
        )
        .unwrap();
        assert_eq!(dest.as_slice(), &[24, 4]);
    }

    #[test]
    fn test_dense_tanh_without_bias() {
        let input = Matrix::from_data(2, 1, vec![8, 8]).unwrap();
        let mut dest = Matrix::column(2).unwrap();
        dense(&mut dest, &input, &weights(), None, Activation::Tanh, q3()).unwrap();
        // weights · input = [24, -4]
        assert_eq!(dest.as_slice(), &[8, -3]);
    }

    #[test]
    fn test_empty_bias_is_skipped() {
        let input = Matrix::from_data(2, 1, vec![8, 8]).unwrap();
        let empty = Matrix::allocate(0, 0).unwrap();
        let mut dest = Matrix::column(2).unwrap();
        dense(
            &mut dest,
            &input,
            &weights(),
            Some(&empty),
            Activation::Linear,
            q3(),
        )
        .unwrap();
        assert_eq!(dest.as_slice(), &[24, -4]);
    }

    #[test]
    fn test_dense_validates_before_writing() {
        let input = Matrix::from_data(2, 1, vec![8, 8]).unwrap();
        let bias = Matrix::column(3).unwrap();
        let mut dest = Matrix::from_data(2, 1, vec![1, 1]).unwrap();
        assert!(matches!(
            dense(
                &mut dest,
                &input,
                &weights(),
                Some(&bias),
                Activation::Linear,
                q3()
            ),
            Err(InferenceError::ShapeMismatch {
                operation: "dense",
                ..
            })
        ));

        let low = Precision::new(2).unwrap();
        assert!(matches!(
            dense(&mut dest, &input, &weights(), None, Activation::Sigmoid, low),
            Err(InferenceError::Arithmetic(_))
        ));
        assert_eq!(dest.as_slice(), &[1, 1]);
    }

    #[test]
    fn test_dense_layer_forward() {
        let bias = Matrix::from_data(2, 1, vec![0, 8]).unwrap();
        let layer = DenseLayer::new(weights(), Some(bias), Activation::Tanh).unwrap();
        assert_eq!(layer.input_size(), 2);
        assert_eq!(layer.output_size(), 2);

        let input = Matrix::from_data(2, 1, vec![8, 8]).unwrap();
        let mut dest = Matrix::column(2).unwrap();
        layer.forward(&mut dest, &input, q3()).unwrap();
        assert_eq!(dest.as_slice(), &[8, 3]);

        layer
            .forward_with(&mut dest, &input, Activation::Linear, q3())
            .unwrap();
        assert_eq!(dest.as_slice(), &[24, 4]);
    }

    #[test]
    fn test_dense_layer_rejects_bad_bias() {
        let bias = Matrix::column(5).unwrap();
        assert!(DenseLayer::new(weights(), Some(bias), Activation::Linear).is_err());
        let layer = DenseLayer::new(weights(), Some(Matrix::allocate(0, 1).unwrap()), Activation::Linear)
            .unwrap();
        assert!(layer.bias().is_none());
    }
}
