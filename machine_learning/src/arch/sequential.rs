use ndarray::{Array2, ArrayView2};

use super::layers::Dense;
use crate::{MlErr, Result};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// The model doesn't own its parameters, they're handed in as a flat slice with every layer's
/// parameters one after the other.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<Dense>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Dense>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    /// Returns the amount of parameters in the model.
    pub fn size(&self) -> usize {
        self.layers.iter().map(Dense::size).sum()
    }

    /// Returns the dimensions of every layer in order.
    pub fn dims(&self) -> Vec<(usize, usize)> {
        self.layers.iter().map(Dense::dim).collect()
    }

    /// Returns the width of the model's input, 0 for an empty model.
    pub fn input_dim(&self) -> usize {
        self.layers.first().map_or(0, |l| l.dim().0)
    }

    /// Returns the width of the model's output, 0 for an empty model.
    pub fn output_dim(&self) -> usize {
        self.layers.last().map_or(0, |l| l.dim().1)
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - The input data.
    ///
    /// # Returns
    /// The prediction for the given input or an error if occurred.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_len("model parameters", params.len())?;

        let mut offset = 0;
        let mut out = x.to_owned();

        for layer in &mut self.layers {
            let end = offset + layer.size();
            out = layer.forward(&params[offset..end], out.view())?;
            offset = end;
        }

        Ok(out)
    }

    /// Makes a backward pass through the network, accumulating every layer's gradient into `grad`.
    ///
    /// Must be called after `forward`, since the layers keep the metadata of the last pass.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `grad` - The model's gradient, same layout as `params`.
    /// * `d` - The derivative of the loss with respect to the model's output.
    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], mut d: Array2<f32>) -> Result<()> {
        self.check_len("model parameters", params.len())?;
        self.check_len("model gradient", grad.len())?;

        let mut end = params.len();

        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&params[start..end], &mut grad[start..end], d)?;
            end = start;
        }

        Ok(())
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        let expected = self.size();

        if got != expected {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::arch::activations::ActFn;

    fn mlp() -> Sequential {
        Sequential::new([
            Dense::new((2, 2), Some(ActFn::relu())),
            Dense::new((2, 1), None),
        ])
    }

    #[test]
    fn size_and_dims_follow_the_layers() {
        let model = mlp();
        assert_eq!(model.size(), 6 + 3);
        assert_eq!(model.dims(), vec![(2, 2), (2, 1)]);
        assert_eq!(model.input_dim(), 2);
        assert_eq!(model.output_dim(), 1);
    }

    #[test]
    fn forward_chains_the_layers() {
        let mut model = mlp();
        #[rustfmt::skip]
        let params = [
            1.0, 0.0, 0.0, 1.0, 0.0, 0.0, // identity + relu
            1.0, 1.0, 0.5,                // sum + 0.5
        ];

        let out = model.forward(&params, array![[1.0, -2.0]].view()).unwrap();
        assert_eq!(out, array![[1.5f32]]);
    }

    #[test]
    fn wrong_parameter_count_is_an_error() {
        let mut model = mlp();
        assert!(model.forward(&[0.0; 4], array![[1.0, 2.0]].view()).is_err());
    }
}
