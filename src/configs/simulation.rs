use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use super::{Device, read_toml};
use crate::error::ConfigError;

const DEFAULT_DATASET_DIR: &str = "datasets/ManipulatorDatasets";

/// The simulation and data settings of a run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub device: Device,
    /// The base name of the dataset, the files are `inputs<name>.npy` and `outputs<name>.npy`.
    pub dataset_filename: String,
    pub dataset_dir: PathBuf,
    /// Seeds the train/test split, the batch shuffling and the parameter initialization.
    pub random_state: u64,
    /// The fraction of the samples held out for testing, in (0, 1).
    pub test_size: f64,
    pub batch_size: NonZeroUsize,
    /// Degrees of freedom of the manipulator.
    pub dof: usize,
    /// The simulation time step.
    pub dt: f64,
    /// The simulated horizon, `D`.
    pub horizon: f64,
    /// The amount of samples per trajectory, `nD`.
    pub samples: usize,
}

#[derive(Debug, Deserialize)]
struct SimulationConfigFile {
    device: String,
    dataset_filename: String,
    dataset_dir: Option<String>,
    random_state: u64,
    test_size: f64,
    batch_size: usize,
    dof: usize,
    dt: f64,
    #[serde(rename = "D")]
    horizon: f64,
    #[serde(rename = "nD")]
    samples: usize,
}

impl SimulationConfig {
    /// Reads and validates a simulation config file.
    ///
    /// # Arguments
    /// * `path` - The TOML file to read.
    ///
    /// # Returns
    /// The config, or an error if the file is missing, malformed or holds invalid values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file: SimulationConfigFile = read_toml(path)?;
        Self::from_file(path, file)
    }

    fn from_file(path: &Path, file: SimulationConfigFile) -> Result<Self, ConfigError> {
        let invalid = |key, msg: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            key,
            msg,
        };

        let device = file
            .device
            .parse::<Device>()
            .map_err(|msg| invalid("device", msg))?;

        if !(file.test_size > 0. && file.test_size < 1.) {
            return Err(invalid(
                "test_size",
                format!("{} is not a fraction in (0, 1)", file.test_size),
            ));
        }

        let batch_size = NonZeroUsize::new(file.batch_size)
            .ok_or_else(|| invalid("batch_size", "must be positive".into()))?;

        if file.dof == 0 {
            return Err(invalid("dof", "must be positive".into()));
        }

        if file.samples == 0 {
            return Err(invalid("nD", "must be positive".into()));
        }

        for (key, value) in [("dt", file.dt), ("D", file.horizon)] {
            if !(value.is_finite() && value > 0.) {
                return Err(invalid(key, format!("{value} is not a positive number")));
            }
        }

        Ok(Self {
            device,
            dataset_filename: file.dataset_filename,
            dataset_dir: file
                .dataset_dir
                .map_or_else(|| PathBuf::from(DEFAULT_DATASET_DIR), PathBuf::from),
            random_state: file.random_state,
            test_size: file.test_size,
            batch_size,
            dof: file.dof,
            dt: file.dt,
            horizon: file.horizon,
            samples: file.samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const VALID: &str = r#"
        device = "cpu"
        dataset_filename = "Test"
        random_state = 1
        test_size = 0.1
        batch_size = 32
        dof = 2
        dt = 0.01
        D = 1.0
        nD = 10
    "#;

    fn load(contents: &str) -> Result<SimulationConfig, ConfigError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).unwrap();
        SimulationConfig::load(&path)
    }

    #[test]
    fn loads_a_valid_file_with_defaults() {
        let config = load(VALID).unwrap();

        assert_eq!(config.device, Device::Cpu);
        assert_eq!(config.dataset_dir, PathBuf::from(DEFAULT_DATASET_DIR));
        assert_eq!(config.batch_size.get(), 32);
        assert_eq!((config.dof, config.samples), (2, 10));
        assert_eq!(config.horizon, 1.0);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = SimulationConfig::load(Path::new("does/not/exist.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn missing_keys_fail_to_parse() {
        let err = load(&VALID.replace("nD = 10", "")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn rejects_invalid_values() {
        for (from, to, key) in [
            ("test_size = 0.1", "test_size = 1.5", "test_size"),
            ("batch_size = 32", "batch_size = 0", "batch_size"),
            ("dt = 0.01", "dt = -0.01", "dt"),
            ("device = \"cpu\"", "device = \"gpu\"", "device"),
        ] {
            let err = load(&VALID.replace(from, to)).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: k, .. } if k == key),
                "{err}"
            );
        }
    }
}
