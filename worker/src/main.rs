use std::sync::Arc;

use comms::CoordinatorClient;
use log::info;
use tokio::signal;

use worker::{
    AssetCache, ClientConfig, GraphEngineFactory, Listener, RoundPipeline, RoundReporter,
    Telemetry, auth, store::LocalStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = ClientConfig::from_env()?;
    let subject = auth::token_subject(config.token());

    let store = Arc::new(LocalStore::open(config.data_dir(), &subject).await?);
    info!("local store at {}", store.root().display());

    let client = CoordinatorClient::new(config.api_base().clone(), config.token());
    let telemetry = Arc::new(Telemetry::new(config.log_interval()));

    let cache = AssetCache::new(Box::new(client.clone()), store.clone());
    let reporter = RoundReporter::new(
        Box::new(client),
        store.clone(),
        telemetry.clone(),
        config.epochs(),
    );
    let pipeline = RoundPipeline::new(
        cache,
        store,
        Box::new(GraphEngineFactory),
        reporter,
        telemetry.clone(),
        config.batch_size(),
    );

    let mut listener = Listener::new(&pipeline, telemetry.clone());
    let source = listener.connect(config.ws_base(), config.token()).await?;
    info!(subject = subject.as_str(); "connected to the coordinator");

    tokio::select! {
        _ = listener.run(source) => {
            info!("signal socket closed, wrapping up...");
        }
        _ = signal::ctrl_c() => {
            info!("received SIGINT");
        }
    }

    telemetry.flush();
    Ok(())
}
