use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    Shape(ShapeError),
    InvalidGraph(String),
    GraphMismatch {
        train: Vec<(usize, usize)>,
        eval: Vec<(usize, usize)>,
    },
    InvalidCheckpoint {
        len: usize,
    },
    EmptyBatch,
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::Shape(e) => write!(f, "Invalid tensor shape: {e}"),
            MlErr::InvalidGraph(detail) => write!(f, "The graph couldn't be decoded: {detail}"),
            MlErr::GraphMismatch { train, eval } => write!(
                f,
                "The train graph layers {train:?} don't match the eval graph layers {eval:?}"
            ),
            MlErr::InvalidCheckpoint { len } => write!(
                f,
                "The checkpoint is {len} bytes long, which isn't a whole amount of f32 parameters"
            ),
            MlErr::EmptyBatch => write!(f, "Tried to run a step over an empty batch"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}
