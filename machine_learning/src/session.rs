use ndarray::Array2;

use crate::{
    EvalOutput, Feeds, MlErr, Result, TrainingEngine,
    arch::{Sequential, loss::LossFn},
    checkpoint,
    graph::{ModelGraph, OptimizerSpec},
    optimization::Optimizer,
};

/// The `TrainingEngine` built from the coordinator's graphs and a checkpoint.
pub struct GraphSession {
    train_model: Sequential,
    train_loss: Box<dyn LossFn>,
    eval_model: Sequential,
    eval_loss: Box<dyn LossFn>,
    optimizer: Box<dyn Optimizer>,
    params: Vec<f32>,
    grad: Vec<f32>,
}

impl GraphSession {
    /// Creates a new `GraphSession` from the raw assets.
    ///
    /// # Arguments
    /// * `train` - The train graph.
    /// * `eval` - The eval graph, must describe the same network as `train`.
    /// * `optimizer` - The optimizer graph.
    /// * `checkpoint` - The starting parameters.
    ///
    /// # Returns
    /// A new session, or an error if any graph can't be decoded, the graphs disagree, the
    /// model doesn't output a single value or the checkpoint doesn't hold exactly the model's
    /// amount of parameters.
    pub fn load(train: &[u8], eval: &[u8], optimizer: &[u8], checkpoint: &[u8]) -> Result<Self> {
        let train = ModelGraph::decode(train)?;
        let eval = ModelGraph::decode(eval)?;
        let optimizer = OptimizerSpec::decode(optimizer)?;
        let params = checkpoint::decode(checkpoint)?;

        Self::new(&train, &eval, &optimizer, params)
    }

    /// Creates a new `GraphSession` from decoded graphs.
    pub fn new(
        train: &ModelGraph,
        eval: &ModelGraph,
        optimizer: &OptimizerSpec,
        params: Vec<f32>,
    ) -> Result<Self> {
        let train_model = train.build_model()?;
        let eval_model = eval.build_model()?;

        if train_model.dims() != eval_model.dims() {
            return Err(MlErr::GraphMismatch {
                train: train_model.dims(),
                eval: eval_model.dims(),
            });
        }

        let outputs = train_model.output_dim();
        if outputs != 1 {
            return Err(MlErr::InvalidGraph(format!(
                "the model outputs {outputs} values per sample, expected 1"
            )));
        }

        let size = train_model.size();
        if params.len() != size {
            return Err(MlErr::SizeMismatch {
                what: "checkpoint parameters",
                got: params.len(),
                expected: size,
            });
        }

        Ok(Self {
            train_loss: train.build_loss(),
            eval_loss: eval.build_loss(),
            optimizer: optimizer.build(size),
            grad: vec![0.; size],
            params,
            train_model,
            eval_model,
        })
    }

    fn check_feeds(&self, feeds: &Feeds<'_>) -> Result<()> {
        let Feeds { input, target } = *feeds;

        if input.nrows() == 0 {
            return Err(MlErr::EmptyBatch);
        }

        let inputs = self.train_model.input_dim();
        if input.ncols() != inputs {
            return Err(MlErr::SizeMismatch {
                what: "input columns",
                got: input.ncols(),
                expected: inputs,
            });
        }

        if target.nrows() != input.nrows() {
            return Err(MlErr::SizeMismatch {
                what: "target rows",
                got: target.nrows(),
                expected: input.nrows(),
            });
        }

        let expected = self.train_model.output_dim();
        if target.ncols() != expected {
            return Err(MlErr::SizeMismatch {
                what: "target columns",
                got: target.ncols(),
                expected,
            });
        }

        Ok(())
    }
}

impl TrainingEngine for GraphSession {
    fn train_step(&mut self, feeds: Feeds<'_>) -> Result<f32> {
        self.check_feeds(&feeds)?;

        let y_pred = self.train_model.forward(&self.params, feeds.input)?;
        let loss = self.train_loss.loss(y_pred.view(), feeds.target);
        let d = self.train_loss.loss_prime(y_pred.view(), feeds.target);

        self.train_model.backward(&self.params, &mut self.grad, d)?;
        Ok(loss)
    }

    fn optimizer_step(&mut self) -> Result<()> {
        self.optimizer.update_params(&mut self.params, &self.grad);
        Ok(())
    }

    fn reset_grad(&mut self) -> Result<()> {
        self.grad.fill(0.);
        Ok(())
    }

    fn eval_step(&mut self, feeds: Feeds<'_>) -> Result<EvalOutput> {
        self.check_feeds(&feeds)?;

        let y_pred: Array2<f32> = self.eval_model.forward(&self.params, feeds.input)?;
        let loss = self.eval_loss.loss(y_pred.view(), feeds.target);

        Ok(EvalOutput {
            loss,
            predictions: y_pred.iter().copied().collect(),
        })
    }

    fn parameters(&self) -> Vec<f32> {
        self.params.clone()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::graph::{LayerSpec, LossFnSpec, ModelSpec};

    fn linear(inputs: usize) -> ModelGraph {
        ModelGraph {
            model: ModelSpec::Sequential {
                layers: vec![LayerSpec::Dense {
                    dim: (inputs, 1),
                    act_fn: None,
                }],
            },
            loss: LossFnSpec::Mse,
        }
    }

    fn session(lr: f32, params: Vec<f32>) -> GraphSession {
        let graph = linear(1);
        let optimizer = OptimizerSpec::GradientDescent { learning_rate: lr };
        GraphSession::new(&graph, &graph, &optimizer, params).unwrap()
    }

    #[test]
    fn load_rejects_a_checkpoint_of_the_wrong_size() {
        let graph = linear(3);
        let optimizer = OptimizerSpec::GradientDescent { learning_rate: 0.1 };
        let checkpoint = checkpoint::encode(&[0.0; 3]);

        let res = GraphSession::load(
            &graph.encode().unwrap(),
            &graph.encode().unwrap(),
            &optimizer.encode().unwrap(),
            &checkpoint,
        );
        assert!(matches!(res, Err(MlErr::SizeMismatch { got: 3, expected: 4, .. })));
    }

    #[test]
    fn load_rejects_mismatching_graphs() {
        let optimizer = OptimizerSpec::GradientDescent { learning_rate: 0.1 };
        let res = GraphSession::new(&linear(2), &linear(3), &optimizer, vec![0.0; 3]);
        assert!(matches!(res, Err(MlErr::GraphMismatch { .. })));
    }

    #[test]
    fn new_rejects_a_model_with_more_than_one_output() {
        let graph = ModelGraph {
            model: ModelSpec::Sequential {
                layers: vec![LayerSpec::Dense {
                    dim: (3, 2),
                    act_fn: None,
                }],
            },
            loss: LossFnSpec::Mse,
        };
        let optimizer = OptimizerSpec::GradientDescent { learning_rate: 0.1 };

        let res = GraphSession::new(&graph, &graph, &optimizer, vec![0.0; 8]);
        assert!(matches!(res, Err(MlErr::InvalidGraph(_))));
    }

    #[test]
    fn a_train_iteration_updates_the_parameters() {
        let mut session = session(0.5, vec![0.0, 0.0]);
        let input = array![[1.0f32]];
        let target = array![[2.0f32]];
        let feeds = Feeds {
            input: input.view(),
            target: target.view(),
        };

        let loss = session.train_step(feeds).unwrap();
        assert_eq!(loss, 4.0);

        session.optimizer_step().unwrap();
        session.reset_grad().unwrap();

        // grad = 2 * (0 - 2) * [x, 1] = [-4, -4]
        assert_eq!(session.parameters(), vec![2.0, 2.0]);
    }

    #[test]
    fn gradients_accumulate_until_reset() {
        let mut session = session(1.0, vec![0.0, 0.0]);
        let input = array![[1.0f32]];
        let target = array![[1.0f32]];
        let feeds = Feeds {
            input: input.view(),
            target: target.view(),
        };

        session.train_step(feeds).unwrap();
        session.train_step(feeds).unwrap();
        session.optimizer_step().unwrap();
        assert_eq!(session.parameters(), vec![4.0, 4.0]);

        session.reset_grad().unwrap();
        session.optimizer_step().unwrap();
        assert_eq!(session.parameters(), vec![4.0, 4.0]);
    }

    #[test]
    fn eval_reports_predictions_without_training() {
        let mut session = session(1.0, vec![2.0, 1.0]);
        let input = array![[1.0f32], [3.0]];
        let target = array![[3.0f32], [5.0]];
        let feeds = Feeds {
            input: input.view(),
            target: target.view(),
        };

        let out = session.eval_step(feeds).unwrap();
        assert_eq!(out.predictions, vec![3.0, 7.0]);
        assert_eq!(out.loss, 2.0);
        assert_eq!(session.parameters(), vec![2.0, 1.0]);
    }

    #[test]
    fn mismatched_feeds_are_errors() {
        let mut session = session(1.0, vec![0.0, 0.0]);
        let input = array![[1.0f32, 2.0]];
        let target = array![[1.0f32]];
        let feeds = Feeds {
            input: input.view(),
            target: target.view(),
        };
        assert!(session.train_step(feeds).is_err());

        let input = array![[1.0f32]];
        let target = array![[1.0f32], [2.0]];
        let feeds = Feeds {
            input: input.view(),
            target: target.view(),
        };
        assert!(session.eval_step(feeds).is_err());
    }
}
