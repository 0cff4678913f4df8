pub mod auth;
pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod listener;
pub mod pipeline;
pub mod report;
pub mod session;
pub mod store;
pub mod telemetry;

pub use cache::{Asset, AssetBundle, AssetCache, AssetFetcher};
pub use config::ClientConfig;
pub use error::{ConfigErr, DatasetErr, Result, RoundErr, StoreErr};
pub use listener::Listener;
pub use pipeline::{RoundHandler, RoundPipeline};
pub use report::{RoundReporter, Uploader};
pub use session::{EngineFactory, GraphEngineFactory, TrainingSession};
pub use telemetry::Telemetry;
