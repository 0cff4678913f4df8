use ndarray::{Array2, ArrayView2};

/// Measures how far a prediction is from the expected output.
pub trait LossFn: Send {
    /// The scalar loss of `y_pred` against `y`.
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32;

    /// The derivative of the loss with respect to every element of `y_pred`.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32>;
}
