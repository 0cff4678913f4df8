//! Drives a round's epochs and reports its outcome.

use std::{collections::BTreeMap, fmt, num::NonZeroUsize, sync::Arc};

use async_trait::async_trait;
use comms::{CoordinatorClient, RoundUpload};
use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{
    Result, RoundErr,
    data::{Dataset, Split},
    session::{SplitMetrics, TrainingSession},
    store::LocalStore,
    telemetry::Telemetry,
};

/// Sends round results to the coordinator.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, upload: &RoundUpload) -> comms::Result<()>;
}

#[async_trait]
impl Uploader for CoordinatorClient {
    async fn upload(&self, upload: &RoundUpload) -> comms::Result<()> {
        self.upload_round(upload).await
    }
}

/// Both splits' metrics after an epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochMetrics {
    pub train: SplitMetrics,
    pub test: SplitMetrics,
}

/// The epoch key of the audit results, serialized as `Epoch <n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EpochLabel(pub usize);

impl fmt::Display for EpochLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch {}", self.0)
    }
}

impl Serialize for EpochLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EpochLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;

        raw.strip_prefix("Epoch ")
            .and_then(|n| n.parse().ok())
            .map(EpochLabel)
            .ok_or_else(|| de::Error::custom(format!("invalid epoch label {raw:?}")))
    }
}

/// The audited errors of a split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitErrors {
    pub mse: f32,
    pub mae: f32,
}

impl From<SplitMetrics> for SplitErrors {
    fn from(value: SplitMetrics) -> Self {
        Self {
            mse: value.mse,
            mae: value.mae,
        }
    }
}

/// The audited errors of an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochResults {
    pub train: SplitErrors,
    pub test: SplitErrors,
}

impl From<EpochMetrics> for EpochResults {
    fn from(value: EpochMetrics) -> Self {
        Self {
            train: value.train.into(),
            test: value.test.into(),
        }
    }
}

/// One entry of the round audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundAudit {
    pub round_label: String,
    pub results: BTreeMap<EpochLabel, EpochResults>,
}

/// What a round hands back to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundResult {
    pub round_id: String,
    pub sample_count: usize,
    pub parameters: Vec<f32>,
}

impl From<RoundResult> for RoundUpload {
    fn from(value: RoundResult) -> Self {
        Self {
            params: value.parameters,
            num_samples: value.sample_count,
            current_round: value.round_id,
        }
    }
}

/// How a completed round went.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundSummary {
    pub round_id: String,
    pub metrics: BTreeMap<EpochLabel, EpochMetrics>,
    pub uploaded: bool,
}

/// Runs a round's epochs, audits them and uploads the resulting parameters.
pub struct RoundReporter {
    uploader: Box<dyn Uploader>,
    store: Arc<LocalStore>,
    telemetry: Arc<Telemetry>,
    epochs: NonZeroUsize,
}

impl RoundReporter {
    /// Creates a new `RoundReporter`.
    ///
    /// # Arguments
    /// * `uploader` - Where round results go.
    /// * `store` - Holds the round audit log.
    /// * `telemetry` - Progress and upload failures are reported here.
    /// * `epochs` - The amount of local epochs per round.
    pub fn new(
        uploader: Box<dyn Uploader>,
        store: Arc<LocalStore>,
        telemetry: Arc<Telemetry>,
        epochs: NonZeroUsize,
    ) -> Self {
        Self {
            uploader,
            store,
            telemetry,
            epochs,
        }
    }

    /// Runs the round.
    ///
    /// Evaluates the starting parameters as epoch 0, then trains and evaluates each epoch.
    /// Only once every epoch succeeded the round is audited, its parameters snapshotted
    /// and uploaded.
    ///
    /// # Arguments
    /// * `round_id` - The coordinator's round id.
    /// * `session` - The round's training session.
    /// * `dataset` - The round's dataset.
    ///
    /// # Returns
    /// The round's summary, or the error that aborted it. A failed upload doesn't fail the
    /// round, it's reported and the parameters are discarded.
    pub async fn run(
        &self,
        round_id: &str,
        session: &mut TrainingSession,
        dataset: &Dataset,
    ) -> Result<RoundSummary> {
        let mut metrics = BTreeMap::new();
        metrics.insert(EpochLabel(0), evaluate(session, dataset).await?);

        let epochs = self.epochs.get();
        for epoch in 1..=epochs {
            let throughput = session.run_epoch(dataset).await.inspect_err(|e| {
                warn!(round_id = round_id, epoch = epoch; "training aborted: {e}");
            })?;

            let epoch_metrics = evaluate(session, dataset).await?;
            self.telemetry.status(format!(
                "round {round_id}: epoch {epoch}/{epochs} done at {throughput:.1} batches/s, \
                 train mse {:.4}, test mse {:.4}",
                epoch_metrics.train.mse, epoch_metrics.test.mse
            ));

            metrics.insert(EpochLabel(epoch), epoch_metrics);
        }

        let audit = RoundAudit {
            round_label: format!("Round {round_id}"),
            results: metrics.iter().map(|(&k, &v)| (k, v.into())).collect(),
        };
        self.store.rounds().append(&audit).await?;

        let result = RoundResult {
            round_id: round_id.to_string(),
            sample_count: dataset.train_count(),
            parameters: session.snapshot_parameters()?,
        };

        let upload = RoundUpload::from(result);
        let uploaded = match self.uploader.upload(&upload).await {
            Ok(()) => {
                info!(round_id = round_id, params = upload.params.len(); "round result uploaded");
                true
            }
            Err(e) => {
                self.telemetry.error(RoundErr::Upload(e).to_string());
                false
            }
        };

        Ok(RoundSummary {
            round_id: round_id.to_string(),
            metrics,
            uploaded,
        })
    }
}

async fn evaluate(session: &mut TrainingSession, dataset: &Dataset) -> Result<EpochMetrics> {
    Ok(EpochMetrics {
        train: session.evaluate(dataset, Split::Train).await?,
        test: session.evaluate(dataset, Split::Test).await?,
    })
}
