use std::{error::Error, fmt, io};

use comms::CommsErr;
use machine_learning::MlErr;

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, RoundErr>;

/// Everything that can end a round early.
#[derive(Debug)]
pub enum RoundErr {
    AssetFetch {
        asset: &'static str,
        source: CommsErr,
    },
    Dataset(DatasetErr),
    SessionCreate(MlErr),
    TrainingStep(MlErr),
    SessionPoisoned,
    Upload(CommsErr),
    Store(StoreErr),
}

impl fmt::Display for RoundErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundErr::AssetFetch { asset, source } => {
                write!(f, "failed to fetch {asset}: {source}")
            }
            RoundErr::Dataset(e) => write!(f, "dataset error: {e}"),
            RoundErr::SessionCreate(e) => write!(f, "failed to create training session: {e}"),
            RoundErr::TrainingStep(e) => write!(f, "training step failed: {e}"),
            RoundErr::SessionPoisoned => {
                write!(f, "training session is unusable after a failed step")
            }
            RoundErr::Upload(e) => write!(f, "failed to upload round result: {e}"),
            RoundErr::Store(e) => write!(f, "local store error: {e}"),
        }
    }
}

impl Error for RoundErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RoundErr::AssetFetch { source, .. } => Some(source),
            RoundErr::Dataset(e) => Some(e),
            RoundErr::SessionCreate(e) | RoundErr::TrainingStep(e) => Some(e),
            RoundErr::Upload(e) => Some(e),
            RoundErr::Store(e) => Some(e),
            RoundErr::SessionPoisoned => None,
        }
    }
}

impl From<DatasetErr> for RoundErr {
    fn from(value: DatasetErr) -> Self {
        Self::Dataset(value)
    }
}

impl From<StoreErr> for RoundErr {
    fn from(value: StoreErr) -> Self {
        Self::Store(value)
    }
}

/// Reasons the local observations can't make a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetErr {
    Empty,
    TooFewSamples { got: usize },
    MixedWidths { expected: usize, got: usize },
}

impl fmt::Display for DatasetErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetErr::Empty => write!(f, "there are no local observations"),
            DatasetErr::TooFewSamples { got } => {
                write!(f, "need at least 2 unique samples, got {got}")
            }
            DatasetErr::MixedWidths { expected, got } => write!(
                f,
                "observations mix feature widths: expected {expected}, got {got}"
            ),
        }
    }
}

impl Error for DatasetErr {}

/// Local store failures.
#[derive(Debug)]
pub enum StoreErr {
    Io(io::Error),
    Decode(serde_json::Error),
    InvalidKey(String),
}

impl fmt::Display for StoreErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreErr::Io(e) => write!(f, "io error: {e}"),
            StoreErr::Decode(e) => write!(f, "corrupted record: {e}"),
            StoreErr::InvalidKey(key) => write!(f, "invalid store key {key:?}"),
        }
    }
}

impl Error for StoreErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreErr::Io(e) => Some(e),
            StoreErr::Decode(e) => Some(e),
            StoreErr::InvalidKey(_) => None,
        }
    }
}

impl From<io::Error> for StoreErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for StoreErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value)
    }
}

/// Invalid or missing environment configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigErr {
    Missing(&'static str),
    Invalid { var: &'static str, value: String },
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErr::Missing(var) => write!(f, "missing environment variable {var}"),
            ConfigErr::Invalid { var, value } => write!(f, "invalid value {value:?} for {var}"),
        }
    }
}

impl Error for ConfigErr {}
