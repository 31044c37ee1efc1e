use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

use machine_learning::MlErr;

use crate::{
    configs::{Device, ModelType},
    data::NpyError,
};

/// Every way a training run can fail. All of them are fatal.
#[derive(Debug)]
pub enum PipelineError {
    /// A configuration file could not be read or is invalid, caught before any data is touched.
    Config(ConfigError),
    /// The simulation and the model were configured for different devices.
    DeviceMismatch { simulation: Device, model: Device },
    /// The configured device can't back any tensor in this build.
    DeviceUnavailable(Device),
    /// The dataset could not be loaded, caught before building the model.
    Dataset(DatasetError),
    UnsupportedModel(UnsupportedModelError),
    /// The architecture hyperparameters don't describe a valid model.
    Model(MlErr),
    /// Training failed, including when the loss diverged.
    Training(MlErr),
    /// The report artifacts could not be written.
    Report(io::Error),
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config error: {e}"),
            Self::DeviceMismatch { simulation, model } => write!(
                f,
                "the model is configured for device {model} but the simulation for {simulation}"
            ),
            Self::DeviceUnavailable(device) => {
                write!(f, "device {device} is not available, only cpu is supported")
            }
            Self::Dataset(e) => write!(f, "dataset error: {e}"),
            Self::UnsupportedModel(e) => write!(f, "{e}"),
            Self::Model(e) => write!(f, "invalid model: {e}"),
            Self::Training(e) => write!(f, "training failed: {e}"),
            Self::Report(e) => write!(f, "failed to write the report: {e}"),
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Dataset(e) => Some(e),
            Self::UnsupportedModel(e) => Some(e),
            Self::Model(e) | Self::Training(e) => Some(e),
            Self::Report(e) => Some(e),
            Self::DeviceMismatch { .. } | Self::DeviceUnavailable(_) => None,
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<DatasetError> for PipelineError {
    fn from(e: DatasetError) -> Self {
        Self::Dataset(e)
    }
}

impl From<UnsupportedModelError> for PipelineError {
    fn from(e: UnsupportedModelError) -> Self {
        Self::UnsupportedModel(e)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    /// The file is missing or unreadable.
    Io { path: PathBuf, source: io::Error },
    /// The file is not valid TOML or lacks a key every config needs.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// A key the selected architecture needs is absent.
    MissingKey { path: PathBuf, key: &'static str },
    Invalid {
        path: PathBuf,
        key: &'static str,
        msg: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cannot read {}: {source}", path.display()),
            Self::Parse { path, source } => write!(f, "cannot parse {}: {source}", path.display()),
            Self::MissingKey { path, key } => {
                write!(f, "{} is missing the key `{key}`", path.display())
            }
            Self::Invalid { path, key, msg } => {
                write!(f, "invalid `{key}` in {}: {msg}", path.display())
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum DatasetError {
    Missing(PathBuf),
    Io { path: PathBuf, source: io::Error },
    Malformed { path: PathBuf, source: NpyError },
    /// The inputs and outputs have a different amount of samples.
    LengthMismatch { inputs: usize, outputs: usize },
    /// The rows don't have the width the model expects.
    FeatureMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// The samples can't be used as a dataset or split with the configured test size.
    Invalid(MlErr),
}

impl Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(path) => write!(f, "{} does not exist", path.display()),
            Self::Io { path, source } => write!(f, "cannot read {}: {source}", path.display()),
            Self::Malformed { path, source } => write!(f, "{} is malformed: {source}", path.display()),
            Self::LengthMismatch { inputs, outputs } => {
                write!(f, "there are {inputs} input samples but {outputs} output samples")
            }
            Self::FeatureMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "the {what} have {got} features per sample, the model expects {expected}"
            ),
            Self::Invalid(e) => write!(f, "{e}"),
        }
    }
}

impl Error for DatasetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Malformed { source, .. } => Some(source),
            Self::Invalid(e) => Some(e),
            _ => None,
        }
    }
}

/// The model selector names no known architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedModelError {
    pub model_type: String,
}

impl Display for UnsupportedModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let valid: Vec<_> = ModelType::ALL.iter().map(ModelType::as_str).collect();
        write!(
            f,
            "model type `{}` not supported, please use one of: {}",
            self.model_type,
            valid.join(", ")
        )
    }
}

impl Error for UnsupportedModelError {}
