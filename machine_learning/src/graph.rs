//! The graph documents a `GraphSession` is built from.
//!
//! The coordinator ships three graphs per model: the train graph and the eval graph describe the
//! network and its loss, the optimizer graph describes the update rule. All of them are json.

use serde::{Deserialize, Serialize};

use crate::{
    MlErr, Result,
    arch::{
        Sequential,
        activations::ActFn,
        layers::Dense,
        loss::{LossFn, Mse},
    },
    optimization::{Adam, GradientDescent, Optimizer},
};

/// The specification for the `ActFn` enum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActFnSpec {
    Sigmoid { amp: f32 },
    Relu,
}

/// The specification for a layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerSpec {
    Dense {
        dim: (usize, usize),
        act_fn: Option<ActFnSpec>,
    },
}

/// The specification for a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSpec {
    Sequential { layers: Vec<LayerSpec> },
}

/// The specification for the `LossFn` trait.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFnSpec {
    Mse,
}

/// The specification for the `Optimizer` trait, it's the whole optimizer graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerSpec {
    Adam {
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    },
    GradientDescent {
        learning_rate: f32,
    },
}

/// A train or eval graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelGraph {
    pub model: ModelSpec,
    pub loss: LossFnSpec,
}

impl ModelGraph {
    /// Decodes a graph blob.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }

    /// Encodes the graph into the blob the coordinator serves.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    /// Builds the network described by this graph.
    ///
    /// # Returns
    /// The model or `MlErr::InvalidGraph` if it's empty or two consecutive layers don't connect.
    pub fn build_model(&self) -> Result<Sequential> {
        let ModelSpec::Sequential { layers } = &self.model;

        if layers.is_empty() {
            return Err(MlErr::InvalidGraph("the model has no layers".into()));
        }

        let dense = layers.iter().map(|&LayerSpec::Dense { dim, act_fn }| {
            let act_fn = act_fn.map(|spec| match spec {
                ActFnSpec::Sigmoid { amp } => ActFn::sigmoid(amp),
                ActFnSpec::Relu => ActFn::relu(),
            });

            Dense::new(dim, act_fn)
        });
        let model = Sequential::new(dense);

        let dims = model.dims();
        for (i, pair) in dims.windows(2).enumerate() {
            if pair[0].1 != pair[1].0 {
                return Err(MlErr::InvalidGraph(format!(
                    "layer {i} outputs {} values but layer {} takes {}",
                    pair[0].1,
                    i + 1,
                    pair[1].0
                )));
            }
        }

        Ok(model)
    }

    /// Builds the loss function of this graph.
    pub fn build_loss(&self) -> Box<dyn LossFn> {
        match self.loss {
            LossFnSpec::Mse => Box::new(Mse::new()),
        }
    }
}

impl OptimizerSpec {
    /// Decodes an optimizer graph blob.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }

    /// Encodes the optimizer graph into the blob the coordinator serves.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    /// Builds the optimizer for a model of `len` parameters.
    pub fn build(&self, len: usize) -> Box<dyn Optimizer> {
        match *self {
            OptimizerSpec::GradientDescent { learning_rate } => {
                Box::new(GradientDescent::new(learning_rate))
            }
            OptimizerSpec::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Box::new(Adam::new(len, learning_rate, beta1, beta2, epsilon)),
        }
    }
}

fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| MlErr::InvalidGraph(e.to_string()))
}

fn encode<T: Serialize>(graph: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(graph).map_err(|e| MlErr::InvalidGraph(e.to_string()))
}
