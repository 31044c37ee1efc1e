use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use ndarray::ShapeError;
use safetensors::SafeTensorError;

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
    InvalidArch(String),
    InvalidInit(String),
    InvalidSplit {
        test_size: f64,
        len: usize,
    },
    EmptyDataset,
    Diverged {
        epoch: usize,
        loss: f32,
    },
    Snapshot(SafeTensorError),
    InvalidSnapshot(String),
    Io(io::Error),
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
            MlErr::Shape(e) => write!(f, "Invalid array shape: {e}"),
            MlErr::InvalidArch(msg) => write!(f, "Invalid architecture: {msg}"),
            MlErr::InvalidInit(msg) => write!(f, "Failed to initialize parameters: {msg}"),
            MlErr::InvalidSplit { test_size, len } => write!(
                f,
                "Cannot split {len} samples with a test size of {test_size}, both partitions must be non-empty"
            ),
            MlErr::EmptyDataset => write!(f, "The dataset has no samples"),
            MlErr::Diverged { epoch, loss } => {
                write!(f, "Training diverged at epoch {epoch}, the loss is {loss}")
            }
            MlErr::Snapshot(e) => write!(f, "Snapshot error: {e}"),
            MlErr::InvalidSnapshot(msg) => write!(f, "Invalid snapshot: {msg}"),
            MlErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            MlErr::Snapshot(e) => Some(e),
            MlErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(e: ShapeError) -> Self {
        Self::Shape(e)
    }
}

impl From<SafeTensorError> for MlErr {
    fn from(e: SafeTensorError) -> Self {
        Self::Snapshot(e)
    }
}

impl From<io::Error> for MlErr {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
