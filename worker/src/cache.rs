//! Keeps the coordinator's assets in the local store.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use comms::{CoordinatorClient, http::endpoints};
use log::debug;
use parking_lot::Mutex;

use crate::{
    Result, RoundErr,
    store::{BlobStore, LocalStore},
};

/// Downloads assets from the coordinator.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetches the asset served at `endpoint`.
    async fn fetch(&self, endpoint: &str) -> comms::Result<Vec<u8>>;
}

#[async_trait]
impl AssetFetcher for CoordinatorClient {
    async fn fetch(&self, endpoint: &str) -> comms::Result<Vec<u8>> {
        self.download(endpoint).await
    }
}

/// The assets a training session is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Asset {
    TrainingGraph,
    EvalGraph,
    OptimizerGraph,
    Checkpoint,
}

impl Asset {
    /// The graphs, fetched at most once.
    pub const GRAPHS: [Asset; 3] = [Asset::TrainingGraph, Asset::EvalGraph, Asset::OptimizerGraph];

    /// The asset's logical filename in the local store.
    pub fn filename(&self) -> &'static str {
        match self {
            Asset::TrainingGraph => "train_mlp_training_model.onnx",
            Asset::EvalGraph => "train_mlp_eval_model.onnx",
            Asset::OptimizerGraph => "train_mlp_optimizer_model.onnx",
            Asset::Checkpoint => "train_mlp_checkpoint",
        }
    }

    /// The coordinator endpoint serving the asset.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Asset::TrainingGraph => endpoints::TRAINING_GRAPH,
            Asset::EvalGraph => endpoints::EVAL_GRAPH,
            Asset::OptimizerGraph => endpoints::OPTIMIZER_GRAPH,
            Asset::Checkpoint => endpoints::CHECKPOINT,
        }
    }
}

/// Everything needed to create a training session.
#[derive(Debug, Clone)]
pub struct AssetBundle {
    pub training: Vec<u8>,
    pub eval: Vec<u8>,
    pub optimizer: Vec<u8>,
    pub checkpoint: Vec<u8>,
}

type Slot = Arc<tokio::sync::Mutex<()>>;

/// Fetches assets on a miss and serves them from the local store afterwards.
///
/// Concurrent requests for the same asset wait for the first one instead of fetching again.
pub struct AssetCache {
    fetcher: Box<dyn AssetFetcher>,
    store: Arc<LocalStore>,
    in_flight: Mutex<HashMap<Asset, Slot>>,
}

impl AssetCache {
    /// Creates a new `AssetCache`.
    ///
    /// # Arguments
    /// * `fetcher` - Where assets come from on a miss.
    /// * `store` - Where assets are kept.
    pub fn new(fetcher: Box<dyn AssetFetcher>, store: Arc<LocalStore>) -> Self {
        Self {
            fetcher,
            store,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the asset, fetching it only if it isn't stored yet.
    pub async fn ensure_cached(&self, asset: Asset) -> Result<Vec<u8>> {
        let slot = self.slot(asset);
        let _guard = slot.lock().await;

        if let Some(blob) = self.blobs(asset).get(asset.filename()).await? {
            debug!(asset = asset.filename(); "asset cache hit");
            return Ok(blob);
        }

        self.fetch_and_store(asset).await
    }

    /// Fetches the asset and overwrites the stored copy.
    pub async fn refresh(&self, asset: Asset) -> Result<Vec<u8>> {
        let slot = self.slot(asset);
        let _guard = slot.lock().await;

        self.fetch_and_store(asset).await
    }

    /// Assembles a round's bundle: cached graphs and a fresh checkpoint.
    pub async fn bundle(&self) -> Result<AssetBundle> {
        let (training, eval, optimizer, checkpoint) = futures::try_join!(
            self.ensure_cached(Asset::TrainingGraph),
            self.ensure_cached(Asset::EvalGraph),
            self.ensure_cached(Asset::OptimizerGraph),
            self.refresh(Asset::Checkpoint),
        )?;

        Ok(AssetBundle {
            training,
            eval,
            optimizer,
            checkpoint,
        })
    }

    fn slot(&self, asset: Asset) -> Slot {
        self.in_flight.lock().entry(asset).or_default().clone()
    }

    fn blobs(&self, asset: Asset) -> &BlobStore {
        match asset {
            Asset::Checkpoint => self.store.checkpoints(),
            _ => self.store.graphs(),
        }
    }

    async fn fetch_and_store(&self, asset: Asset) -> Result<Vec<u8>> {
        let blob = self
            .fetcher
            .fetch(asset.endpoint())
            .await
            .map_err(|source| RoundErr::AssetFetch {
                asset: asset.filename(),
                source,
            })?;

        self.blobs(asset).put(asset.filename(), &blob).await?;
        debug!(asset = asset.filename(), bytes = blob.len(); "asset fetched");
        Ok(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assets_have_distinct_names_and_endpoints() {
        let all = [
            Asset::TrainingGraph,
            Asset::EvalGraph,
            Asset::OptimizerGraph,
            Asset::Checkpoint,
        ];

        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.filename(), b.filename());
                assert_ne!(a.endpoint(), b.endpoint());
            }
        }
    }
}
