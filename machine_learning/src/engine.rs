use ndarray::ArrayView2;

use crate::Result;

/// The tensors fed to every engine step.
#[derive(Debug, Clone, Copy)]
pub struct Feeds<'a> {
    /// `[batch_size, features]`
    pub input: ArrayView2<'a, f32>,
    /// `[batch_size, 1]`
    pub target: ArrayView2<'a, f32>,
}

/// What an evaluation step reports.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutput {
    pub loss: f32,
    /// One prediction per sample of the batch, in order.
    pub predictions: Vec<f32>,
}

/// A stateful training engine bound to a model, its optimizer and its parameters.
///
/// A training iteration is `train_step`, `optimizer_step` and `reset_grad` in that order,
/// gradients accumulate across train steps until they're reset.
pub trait TrainingEngine: Send {
    /// Runs a forward and backward pass, accumulating the gradient.
    ///
    /// # Returns
    /// The loss of the batch.
    fn train_step(&mut self, feeds: Feeds<'_>) -> Result<f32>;

    /// Applies the accumulated gradient to the parameters.
    fn optimizer_step(&mut self) -> Result<()>;

    /// Zeroes the accumulated gradient.
    fn reset_grad(&mut self) -> Result<()>;

    /// Runs a forward pass of the eval graph, doesn't touch the gradient nor the parameters.
    fn eval_step(&mut self, feeds: Feeds<'_>) -> Result<EvalOutput>;

    /// Copies the full, contiguous parameter vector.
    fn parameters(&self) -> Vec<f32>;
}
