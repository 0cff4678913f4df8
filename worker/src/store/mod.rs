//! The per user persistent store.
//!
//! Every user gets its own directory, holding the blob stores for the coordinator's assets
//! and the append only logs for round audits and observations.

mod blob;
mod journal;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::StoreErr;

pub use blob::BlobStore;
pub use journal::JsonLog;

const GRAPHS_DIR: &str = "local_onnx_files";
const CHECKPOINTS_DIR: &str = "downloaded_checkpoint";
const ROUNDS_LOG: &str = "local_fl_rounds_logs.jsonl";
const OBSERVATIONS_LOG: &str = "user_data_observations.jsonl";

/// One ingestion batch of locally captured samples.
///
/// `features[i]`, `labels[i]` and `timestamps[i]` describe the same sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationBatch {
    pub features: Vec<Vec<f32>>,
    pub labels: Vec<f32>,
    pub timestamps: Vec<i64>,
}

/// A user's local store.
#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    graphs: BlobStore,
    checkpoints: BlobStore,
    rounds: JsonLog,
    observations: JsonLog,
}

impl LocalStore {
    /// Opens the store of `subject` under `data_dir`, creating it if needed.
    ///
    /// # Arguments
    /// * `data_dir` - The directory holding every user's store.
    /// * `subject` - The user's token subject.
    pub async fn open(data_dir: &Path, subject: &str) -> Result<Self, StoreErr> {
        let root = data_dir.join(blob::check_key(subject)?);
        fs::create_dir_all(&root).await?;

        Ok(Self {
            graphs: BlobStore::open(root.join(GRAPHS_DIR)).await?,
            checkpoints: BlobStore::open(root.join(CHECKPOINTS_DIR)).await?,
            rounds: JsonLog::new(root.join(ROUNDS_LOG)),
            observations: JsonLog::new(root.join(OBSERVATIONS_LOG)),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The graph blobs.
    pub fn graphs(&self) -> &BlobStore {
        &self.graphs
    }

    /// The checkpoint blobs.
    pub fn checkpoints(&self) -> &BlobStore {
        &self.checkpoints
    }

    /// The round audit log.
    pub fn rounds(&self) -> &JsonLog {
        &self.rounds
    }

    /// Appends an observation batch, this is the ingestion path's entrypoint.
    pub async fn append_observations(&self, batch: &ObservationBatch) -> Result<u64, StoreErr> {
        self.observations.append(batch).await
    }

    /// Reads every observation batch in store order.
    pub async fn observations(&self) -> Result<Vec<ObservationBatch>, StoreErr> {
        let entries = self.observations.entries().await?;
        Ok(entries.into_iter().map(|(_, batch)| batch).collect())
    }
}
