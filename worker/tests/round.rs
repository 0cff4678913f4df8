use std::{
    collections::HashMap,
    num::NonZeroUsize,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use comms::{CommsErr, RoundUpload, http::endpoints};
use machine_learning::{
    EvalOutput, Feeds, MlErr, TrainingEngine, checkpoint,
    graph::{LayerSpec, LossFnSpec, ModelGraph, ModelSpec, OptimizerSpec},
};
use parking_lot::Mutex;
use worker::{
    Asset, AssetBundle, AssetCache, AssetFetcher, EngineFactory, GraphEngineFactory,
    RoundHandler, RoundPipeline, RoundReporter, RoundErr, Telemetry, Uploader,
    report::{EpochLabel, RoundAudit},
    store::{LocalStore, ObservationBatch},
};

/// Serves canned assets and counts every fetch per endpoint.
#[derive(Clone, Default)]
struct FakeCoordinator {
    assets: Arc<HashMap<&'static str, Vec<u8>>>,
    fetches: Arc<Mutex<HashMap<String, usize>>>,
    uploads: Arc<Mutex<Vec<RoundUpload>>>,
    fail_uploads: bool,
}

impl FakeCoordinator {
    fn new() -> Self {
        let graph = ModelGraph {
            model: ModelSpec::Sequential {
                layers: vec![LayerSpec::Dense {
                    dim: (3, 1),
                    act_fn: None,
                }],
            },
            loss: LossFnSpec::Mse,
        };
        let optimizer = OptimizerSpec::GradientDescent {
            learning_rate: 0.01,
        };

        let assets = HashMap::from([
            (endpoints::TRAINING_GRAPH, graph.encode().unwrap()),
            (endpoints::EVAL_GRAPH, graph.encode().unwrap()),
            (endpoints::OPTIMIZER_GRAPH, optimizer.encode().unwrap()),
            (endpoints::CHECKPOINT, checkpoint::encode(&[0.0; 4])),
        ]);

        Self {
            assets: Arc::new(assets),
            ..Default::default()
        }
    }

    fn fetches(&self, endpoint: &str) -> usize {
        self.fetches.lock().get(endpoint).copied().unwrap_or(0)
    }
}

fn comms_failure() -> CommsErr {
    CommsErr::InvalidUrl(url::ParseError::EmptyHost)
}

#[async_trait]
impl AssetFetcher for FakeCoordinator {
    async fn fetch(&self, endpoint: &str) -> comms::Result<Vec<u8>> {
        *self.fetches.lock().entry(endpoint.to_string()).or_default() += 1;

        // Let concurrent callers pile up behind this fetch.
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        self.assets.get(endpoint).cloned().ok_or_else(comms_failure)
    }
}

#[async_trait]
impl Uploader for FakeCoordinator {
    async fn upload(&self, upload: &RoundUpload) -> comms::Result<()> {
        if self.fail_uploads {
            return Err(comms_failure());
        }

        self.uploads.lock().push(upload.clone());
        Ok(())
    }
}

/// An engine whose `fail_at`th train step fails, counting parameter snapshots.
struct FlakyEngine {
    steps: usize,
    fail_at: usize,
    snapshots: Arc<AtomicUsize>,
}

impl TrainingEngine for FlakyEngine {
    fn train_step(&mut self, _: Feeds<'_>) -> machine_learning::Result<f32> {
        self.steps += 1;
        if self.steps == self.fail_at {
            return Err(MlErr::EmptyBatch);
        }
        Ok(1.0)
    }

    fn optimizer_step(&mut self) -> machine_learning::Result<()> {
        Ok(())
    }

    fn reset_grad(&mut self) -> machine_learning::Result<()> {
        Ok(())
    }

    fn eval_step(&mut self, feeds: Feeds<'_>) -> machine_learning::Result<EvalOutput> {
        Ok(EvalOutput {
            loss: 1.0,
            predictions: vec![0.0; feeds.input.nrows()],
        })
    }

    fn parameters(&self) -> Vec<f32> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        vec![0.0; 4]
    }
}

struct FlakyFactory {
    fail_at: usize,
    snapshots: Arc<AtomicUsize>,
}

impl EngineFactory for FlakyFactory {
    fn create(&self, _: &AssetBundle) -> machine_learning::Result<Box<dyn TrainingEngine>> {
        Ok(Box::new(FlakyEngine {
            steps: 0,
            fail_at: self.fail_at,
            snapshots: self.snapshots.clone(),
        }))
    }
}

async fn open_store(dir: &Path, samples: usize) -> Arc<LocalStore> {
    let store = LocalStore::open(dir, "guest").await.unwrap();

    let features = (0..samples)
        .map(|i| vec![i as f32 / 10.0, 1.0, -(i as f32) / 10.0])
        .collect();
    let labels = (0..samples).map(|i| i as f32 / 5.0).collect();
    let timestamps = (0..samples as i64).collect();

    store
        .append_observations(&ObservationBatch {
            features,
            labels,
            timestamps,
        })
        .await
        .unwrap();

    Arc::new(store)
}

fn pipeline(
    coordinator: &FakeCoordinator,
    store: &Arc<LocalStore>,
    factory: Box<dyn EngineFactory>,
) -> RoundPipeline {
    let telemetry = Arc::new(Telemetry::new(Duration::ZERO));
    let cache = AssetCache::new(Box::new(coordinator.clone()), store.clone());
    let reporter = RoundReporter::new(
        Box::new(coordinator.clone()),
        store.clone(),
        telemetry.clone(),
        NonZeroUsize::new(5).unwrap(),
    );

    RoundPipeline::new(
        cache,
        store.clone(),
        factory,
        reporter,
        telemetry,
        NonZeroUsize::new(4).unwrap(),
    )
}

async fn audits(store: &LocalStore) -> Vec<RoundAudit> {
    let entries: Vec<(u64, RoundAudit)> = store.rounds().entries().await.unwrap();
    entries.into_iter().map(|(_, audit)| audit).collect()
}

#[tokio::test]
async fn concurrent_requests_for_an_asset_fetch_it_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path(), 0).await;
    let coordinator = FakeCoordinator::new();
    let cache = AssetCache::new(Box::new(coordinator.clone()), store);

    let (a, b) = tokio::join!(
        cache.ensure_cached(Asset::TrainingGraph),
        cache.ensure_cached(Asset::TrainingGraph),
    );
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(coordinator.fetches(endpoints::TRAINING_GRAPH), 1);

    cache.ensure_cached(Asset::TrainingGraph).await.unwrap();
    assert_eq!(coordinator.fetches(endpoints::TRAINING_GRAPH), 1);
}

#[tokio::test]
async fn the_checkpoint_is_fetched_every_round() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path(), 0).await;
    let coordinator = FakeCoordinator::new();
    let cache = AssetCache::new(Box::new(coordinator.clone()), store.clone());

    cache.bundle().await.unwrap();
    cache.bundle().await.unwrap();

    assert_eq!(coordinator.fetches(endpoints::CHECKPOINT), 2);
    assert_eq!(coordinator.fetches(endpoints::EVAL_GRAPH), 1);

    let stored = store
        .checkpoints()
        .get(Asset::Checkpoint.filename())
        .await
        .unwrap();
    assert_eq!(stored, Some(checkpoint::encode(&[0.0; 4])));
}

#[tokio::test]
async fn cached_graphs_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = FakeCoordinator::new();

    let store = open_store(dir.path(), 0).await;
    let cache = AssetCache::new(Box::new(coordinator.clone()), store);
    cache.ensure_cached(Asset::OptimizerGraph).await.unwrap();

    let store = Arc::new(LocalStore::open(dir.path(), "guest").await.unwrap());
    let cache = AssetCache::new(Box::new(coordinator.clone()), store);
    cache.ensure_cached(Asset::OptimizerGraph).await.unwrap();

    assert_eq!(coordinator.fetches(endpoints::OPTIMIZER_GRAPH), 1);
}

#[tokio::test]
async fn a_round_trains_audits_and_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path(), 10).await;
    let coordinator = FakeCoordinator::new();
    let pipeline = pipeline(&coordinator, &store, Box::new(GraphEngineFactory));

    pipeline.prewarm().await.unwrap();
    let summary = pipeline.run_round("7".into()).await.unwrap();

    assert!(summary.uploaded);
    let labels: Vec<_> = summary.metrics.keys().copied().collect();
    assert_eq!(labels, (0..=5).map(EpochLabel).collect::<Vec<_>>());

    // Training on a learnable relation lowers the train error.
    let first = summary.metrics[&EpochLabel(0)].train.mse;
    let last = summary.metrics[&EpochLabel(5)].train.mse;
    assert!(last < first, "{first} -> {last}");

    let uploads = coordinator.uploads.lock().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].num_samples, 8);
    assert_eq!(uploads[0].current_round, "7");
    assert_eq!(uploads[0].params.len(), 4);

    let audits = audits(&store).await;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].round_label, "Round 7");
    assert_eq!(audits[0].results.len(), 6);

    for endpoint in [
        endpoints::TRAINING_GRAPH,
        endpoints::EVAL_GRAPH,
        endpoints::OPTIMIZER_GRAPH,
        endpoints::CHECKPOINT,
    ] {
        assert_eq!(coordinator.fetches(endpoint), 1, "{endpoint}");
    }
}

#[tokio::test]
async fn a_failed_epoch_skips_audit_snapshot_and_upload() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path(), 10).await;
    let coordinator = FakeCoordinator::new();

    // 8 train samples in batches of 4, the 3rd step is the first one of epoch 2.
    let snapshots = Arc::new(AtomicUsize::new(0));
    let factory = FlakyFactory {
        fail_at: 3,
        snapshots: snapshots.clone(),
    };
    let pipeline = pipeline(&coordinator, &store, Box::new(factory));

    let res = pipeline.run_round("1".into()).await;
    assert!(matches!(res, Err(RoundErr::TrainingStep(_))));

    assert_eq!(snapshots.load(Ordering::SeqCst), 0);
    assert!(coordinator.uploads.lock().is_empty());
    assert!(audits(&store).await.is_empty());
}

#[tokio::test]
async fn a_failed_upload_keeps_the_audit() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path(), 10).await;
    let coordinator = FakeCoordinator {
        fail_uploads: true,
        ..FakeCoordinator::new()
    };
    let pipeline = pipeline(&coordinator, &store, Box::new(GraphEngineFactory));

    let summary = pipeline.run_round("2".into()).await.unwrap();
    assert!(!summary.uploaded);
    assert_eq!(audits(&store).await.len(), 1);
}

#[tokio::test]
async fn too_few_observations_abort_before_training() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path(), 1).await;
    let coordinator = FakeCoordinator::new();
    let pipeline = pipeline(&coordinator, &store, Box::new(GraphEngineFactory));

    let res = pipeline.run_round("3".into()).await;
    assert!(matches!(res, Err(RoundErr::Dataset(_))));
    assert!(coordinator.uploads.lock().is_empty());
}

#[tokio::test]
async fn a_missing_asset_aborts_the_round() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path(), 10).await;
    let coordinator = FakeCoordinator {
        assets: Arc::new(HashMap::new()),
        ..FakeCoordinator::new()
    };
    let pipeline = pipeline(&coordinator, &store, Box::new(GraphEngineFactory));

    let res = pipeline.run_round("4".into()).await;
    assert!(matches!(res, Err(RoundErr::AssetFetch { .. })));
}
