pub mod arch;
pub mod checkpoint;
mod engine;
mod error;
pub mod graph;
pub mod optimization;
mod session;

pub use engine::{EvalOutput, Feeds, TrainingEngine};
pub use error::{MlErr, Result};
pub use session::GraphSession;
