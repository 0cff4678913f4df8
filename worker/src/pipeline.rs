use std::{num::NonZeroUsize, sync::Arc};

use async_trait::async_trait;
use futures::future;
use log::info;

use crate::{
    Result,
    cache::{Asset, AssetCache},
    data,
    report::{RoundReporter, RoundSummary},
    session::{EngineFactory, TrainingSession},
    store::LocalStore,
    telemetry::Telemetry,
};

/// What the listener drives.
#[async_trait]
pub trait RoundHandler: Send + Sync {
    /// Makes sure every graph is cached before the first round.
    async fn prewarm(&self) -> Result<()>;

    /// Runs a whole round.
    async fn run_round(&self, round_id: String) -> Result<RoundSummary>;
}

/// The round pipeline: fetch the assets, assemble the dataset, train and report.
pub struct RoundPipeline {
    cache: AssetCache,
    store: Arc<LocalStore>,
    factory: Box<dyn EngineFactory>,
    reporter: RoundReporter,
    telemetry: Arc<Telemetry>,
    batch_size: NonZeroUsize,
}

impl RoundPipeline {
    /// Creates a new `RoundPipeline`.
    ///
    /// # Arguments
    /// * `cache` - The asset cache.
    /// * `store` - The user's local store, source of the observations.
    /// * `factory` - Builds each round's training engine.
    /// * `reporter` - Drives the epochs and reports the result.
    /// * `telemetry` - Progress is reported here.
    /// * `batch_size` - The amount of samples per batch.
    pub fn new(
        cache: AssetCache,
        store: Arc<LocalStore>,
        factory: Box<dyn EngineFactory>,
        reporter: RoundReporter,
        telemetry: Arc<Telemetry>,
        batch_size: NonZeroUsize,
    ) -> Self {
        Self {
            cache,
            store,
            factory,
            reporter,
            telemetry,
            batch_size,
        }
    }
}

#[async_trait]
impl RoundHandler for RoundPipeline {
    async fn prewarm(&self) -> Result<()> {
        let fetches = Asset::GRAPHS.map(|asset| self.cache.ensure_cached(asset));
        future::try_join_all(fetches).await?;

        self.telemetry.status("model graphs ready");
        Ok(())
    }

    async fn run_round(&self, round_id: String) -> Result<RoundSummary> {
        info!(round_id = round_id.as_str(); "round started");
        self.telemetry.status(format!("round {round_id}: fetching assets"));

        let bundle = self.cache.bundle().await?;
        let dataset = data::assemble(&self.store, self.batch_size).await?;
        self.telemetry.status(format!(
            "round {round_id}: training on {} samples, testing on {}",
            dataset.train_count(),
            dataset.test_count()
        ));

        let mut session = TrainingSession::create(self.factory.as_ref(), &bundle)?;
        drop(bundle);

        let summary = self.reporter.run(&round_id, &mut session, &dataset).await?;
        info!(round_id = round_id.as_str(), uploaded = summary.uploaded; "round finished");
        Ok(summary)
    }
}
