use std::time::Instant;

use log::debug;
use machine_learning::{GraphSession, TrainingEngine};
use serde::{Deserialize, Serialize};

use crate::{
    Result, RoundErr,
    cache::AssetBundle,
    data::{Dataset, Split},
};

/// Builds training engines out of asset bundles.
pub trait EngineFactory: Send + Sync {
    fn create(&self, bundle: &AssetBundle) -> machine_learning::Result<Box<dyn TrainingEngine>>;
}

/// The factory of the graph interpreting engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphEngineFactory;

impl EngineFactory for GraphEngineFactory {
    fn create(&self, bundle: &AssetBundle) -> machine_learning::Result<Box<dyn TrainingEngine>> {
        let session = GraphSession::load(
            &bundle.training,
            &bundle.eval,
            &bundle.optimizer,
            &bundle.checkpoint,
        )?;

        Ok(Box::new(session))
    }
}

/// The evaluation metrics of a single split.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitMetrics {
    pub average_loss: f32,
    pub mse: f32,
    pub mae: f32,
}

/// A training engine bound to one round's assets.
///
/// Once a step fails the session is poisoned and every further call fails.
pub struct TrainingSession {
    engine: Box<dyn TrainingEngine>,
    poisoned: bool,
}

impl TrainingSession {
    /// Creates a new `TrainingSession`.
    ///
    /// # Arguments
    /// * `factory` - Builds the engine.
    /// * `bundle` - The round's assets.
    ///
    /// # Returns
    /// The session or `RoundErr::SessionCreate` if the engine rejects the bundle.
    pub fn create(factory: &dyn EngineFactory, bundle: &AssetBundle) -> Result<Self> {
        let engine = factory.create(bundle).map_err(RoundErr::SessionCreate)?;

        Ok(Self {
            engine,
            poisoned: false,
        })
    }

    /// Trains over the whole train split once, in order.
    ///
    /// # Returns
    /// The throughput in batches per second.
    pub async fn run_epoch(&mut self, dataset: &Dataset) -> Result<f64> {
        self.check()?;

        let start = Instant::now();
        let mut batches = 0;

        for feeds in dataset.train_batches() {
            let step = self
                .engine
                .train_step(feeds)
                .and_then(|_| self.engine.optimizer_step())
                .and_then(|_| self.engine.reset_grad());

            if let Err(e) = step {
                self.poisoned = true;
                return Err(RoundErr::TrainingStep(e));
            }

            batches += 1;
            tokio::task::yield_now().await;
        }

        let elapsed = start.elapsed().as_secs_f64();
        let throughput = if elapsed > 0.0 {
            batches as f64 / elapsed
        } else {
            0.0
        };

        debug!(batches = batches, throughput = throughput; "epoch done");
        Ok(throughput)
    }

    /// Evaluates the session over `split`.
    ///
    /// The errors are computed over every prediction of the split, the loss is averaged
    /// per batch.
    pub async fn evaluate(&mut self, dataset: &Dataset, split: Split) -> Result<SplitMetrics> {
        self.check()?;

        let mut loss = 0.0;
        let mut batches = 0;
        let mut squared = 0.0;
        let mut absolute = 0.0;
        let mut samples = 0;

        for feeds in dataset.batches(split) {
            let out = match self.engine.eval_step(feeds) {
                Ok(out) => out,
                Err(e) => {
                    self.poisoned = true;
                    return Err(RoundErr::TrainingStep(e));
                }
            };

            loss += out.loss;
            batches += 1;

            for (pred, target) in out.predictions.iter().zip(feeds.target.iter()) {
                let diff = pred - target;
                squared += diff * diff;
                absolute += diff.abs();
                samples += 1;
            }

            tokio::task::yield_now().await;
        }

        if batches == 0 {
            return Ok(SplitMetrics::default());
        }

        let metrics = SplitMetrics {
            average_loss: loss / batches as f32,
            mse: squared / samples as f32,
            mae: absolute / samples as f32,
        };

        debug!(split = split.name(), mse = metrics.mse, mae = metrics.mae; "evaluated");
        Ok(metrics)
    }

    /// Copies the full parameter vector without touching the session.
    pub fn snapshot_parameters(&self) -> Result<Vec<f32>> {
        self.check()?;
        Ok(self.engine.parameters())
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn check(&self) -> Result<()> {
        if self.poisoned {
            return Err(RoundErr::SessionPoisoned);
        }

        Ok(())
    }
}
