use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::Deserialize;

use super::{Device, read_toml};
use crate::error::{ConfigError, UnsupportedModelError};

const DEFAULT_MODEL_DIR: &str = "models";
const DEFAULT_REPORT_DIR: &str = ".";

/// The architectures a run can train.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    DeepONet,
    Fno,
    FnoGru,
    DeepONetGru,
}

impl ModelType {
    pub const ALL: [ModelType; 4] = [Self::DeepONet, Self::Fno, Self::FnoGru, Self::DeepONetGru];

    /// Returns the selector naming this architecture in the config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeepONet => "DeepONet",
            Self::Fno => "FNO",
            Self::FnoGru => "FNO+GRU",
            Self::DeepONetGru => "DeepONet+GRU",
        }
    }

    /// Whether the architecture evaluates a DeepONet on the spatial grid.
    pub fn uses_grid(&self) -> bool {
        matches!(self, Self::DeepONet | Self::DeepONetGru)
    }
}

impl FromStr for ModelType {
    type Err = UnsupportedModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|model_type| model_type.as_str() == s)
            .ok_or_else(|| UnsupportedModelError {
                model_type: s.to_string(),
            })
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The widths of a model's input and output, derived from the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channels {
    pub input: usize,
    pub output: usize,
}

/// The hyperparameters specific to each architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    DeepONet {
        dim_x: usize,
        hidden_size: usize,
        num_layers: usize,
    },
    Fno {
        hidden_size: usize,
        num_layers: usize,
        modes: usize,
    },
    FnoGru {
        fno_num_layers: usize,
        gru_num_layers: usize,
        fno_hidden_size: usize,
        gru_hidden_size: usize,
        modes: usize,
    },
    DeepONetGru {
        dim_x: usize,
        deeponet_num_layers: usize,
        gru_num_layers: usize,
        deeponet_hidden_size: usize,
        gru_hidden_size: usize,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ArchitectureKeys {
    dim_x: Option<usize>,
    hidden_size: Option<usize>,
    num_layers: Option<usize>,
    modes: Option<usize>,
    fno_num_layers: Option<usize>,
    gru_num_layers: Option<usize>,
    fno_hidden_size: Option<usize>,
    gru_hidden_size: Option<usize>,
    deeponet_num_layers: Option<usize>,
    deeponet_hidden_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ModelConfigFile {
    model_type: String,
    device: String,
    model_filename: String,
    model_dir: Option<String>,
    report_dir: Option<String>,
    epochs: usize,
    learning_rate: f32,
    weight_decay: Option<f32>,
    gamma: Option<f32>,
    scheduler_step_size: Option<usize>,
    #[serde(flatten)]
    architecture: ArchitectureKeys,
}

/// A parsed model config whose derived fields are still unknown. The only way to
/// read a complete config is to `freeze` it.
#[derive(Debug, Clone)]
pub struct ModelConfigDraft {
    path: PathBuf,
    model_type: String,
    device: Device,
    model_filename: String,
    model_dir: PathBuf,
    report_dir: PathBuf,
    epochs: usize,
    learning_rate: f32,
    weight_decay: f32,
    gamma: f32,
    scheduler_step_size: usize,
    architecture: ArchitectureKeys,
}

/// The complete settings of the model to train.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model_type: ModelType,
    pub device: Device,
    pub model_filename: String,
    pub model_dir: PathBuf,
    pub report_dir: PathBuf,
    pub epochs: usize,
    pub learning_rate: f32,
    pub weight_decay: f32,
    /// The learning rate decay factor.
    pub gamma: f32,
    /// The amount of epochs between learning rate decays.
    pub scheduler_step_size: usize,
    pub input_channel: usize,
    pub output_channel: usize,
    pub architecture: Architecture,
}

impl ModelConfig {
    /// Returns the file the best parameters are written to.
    pub fn snapshot_path(&self) -> PathBuf {
        self.model_dir
            .join(format!("{}.safetensors", self.model_filename))
    }
}

impl ModelConfigDraft {
    /// Reads and validates a model config file, leaving the model type unchecked.
    ///
    /// # Arguments
    /// * `path` - The TOML file to read.
    ///
    /// # Returns
    /// The draft, or an error if the file is missing, malformed or holds invalid values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file: ModelConfigFile = read_toml(path)?;
        Self::from_file(path, file)
    }

    fn from_file(path: &Path, file: ModelConfigFile) -> Result<Self, ConfigError> {
        let invalid = |key, msg: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            key,
            msg,
        };

        let device = file
            .device
            .parse::<Device>()
            .map_err(|msg| invalid("device", msg))?;

        if file.epochs == 0 {
            return Err(invalid("epochs", "must be positive".into()));
        }

        if !(file.learning_rate.is_finite() && file.learning_rate > 0.) {
            return Err(invalid(
                "learning_rate",
                format!("{} is not a positive number", file.learning_rate),
            ));
        }

        let weight_decay = file.weight_decay.unwrap_or(0.);
        if !(weight_decay.is_finite() && weight_decay >= 0.) {
            return Err(invalid(
                "weight_decay",
                format!("{weight_decay} is not a non-negative number"),
            ));
        }

        let gamma = file.gamma.unwrap_or(1.);
        if !(gamma.is_finite() && gamma > 0.) {
            return Err(invalid("gamma", format!("{gamma} is not a positive number")));
        }

        let scheduler_step_size = file.scheduler_step_size.unwrap_or(1);
        if scheduler_step_size == 0 {
            return Err(invalid("scheduler_step_size", "must be positive".into()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            model_type: file.model_type,
            device,
            model_filename: file.model_filename,
            model_dir: file
                .model_dir
                .map_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR), PathBuf::from),
            report_dir: file
                .report_dir
                .map_or_else(|| PathBuf::from(DEFAULT_REPORT_DIR), PathBuf::from),
            epochs: file.epochs,
            learning_rate: file.learning_rate,
            weight_decay,
            gamma,
            scheduler_step_size,
            architecture: file.architecture,
        })
    }

    /// Returns the raw model selector.
    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Completes the config with the derived fields, consuming the draft.
    ///
    /// # Arguments
    /// * `model_type` - The parsed model selector.
    /// * `channels` - The input and output widths derived from the simulation.
    ///
    /// # Returns
    /// The complete config, or `ConfigError::MissingKey` if the file lacks a hyperparameter
    /// the architecture needs.
    pub fn freeze(
        self,
        model_type: ModelType,
        channels: Channels,
    ) -> Result<ModelConfig, ConfigError> {
        let keys = &self.architecture;
        let require = |key: &'static str, value: Option<usize>| {
            value.ok_or_else(|| ConfigError::MissingKey {
                path: self.path.clone(),
                key,
            })
        };

        let architecture = match model_type {
            ModelType::DeepONet => Architecture::DeepONet {
                dim_x: require("dim_x", keys.dim_x)?,
                hidden_size: require("hidden_size", keys.hidden_size)?,
                num_layers: require("num_layers", keys.num_layers)?,
            },
            ModelType::Fno => Architecture::Fno {
                hidden_size: require("hidden_size", keys.hidden_size)?,
                num_layers: require("num_layers", keys.num_layers)?,
                modes: require("modes", keys.modes)?,
            },
            ModelType::FnoGru => Architecture::FnoGru {
                fno_num_layers: require("fno_num_layers", keys.fno_num_layers)?,
                gru_num_layers: require("gru_num_layers", keys.gru_num_layers)?,
                fno_hidden_size: require("fno_hidden_size", keys.fno_hidden_size)?,
                gru_hidden_size: require("gru_hidden_size", keys.gru_hidden_size)?,
                modes: require("modes", keys.modes)?,
            },
            ModelType::DeepONetGru => Architecture::DeepONetGru {
                dim_x: require("dim_x", keys.dim_x)?,
                deeponet_num_layers: require("deeponet_num_layers", keys.deeponet_num_layers)?,
                gru_num_layers: require("gru_num_layers", keys.gru_num_layers)?,
                deeponet_hidden_size: require("deeponet_hidden_size", keys.deeponet_hidden_size)?,
                gru_hidden_size: require("gru_hidden_size", keys.gru_hidden_size)?,
            },
        };

        Ok(ModelConfig {
            model_type,
            device: self.device,
            model_filename: self.model_filename,
            model_dir: self.model_dir,
            report_dir: self.report_dir,
            epochs: self.epochs,
            learning_rate: self.learning_rate,
            weight_decay: self.weight_decay,
            gamma: self.gamma,
            scheduler_step_size: self.scheduler_step_size,
            input_channel: channels.input,
            output_channel: channels.output,
            architecture,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const DEEPONET: &str = r#"
        model_type = "DeepONet"
        device = "cpu"
        model_filename = "deeponet"
        epochs = 10
        learning_rate = 1e-3
        gamma = 0.9
        dim_x = 1
        hidden_size = 64
        num_layers = 3
    "#;

    fn load(contents: &str) -> Result<ModelConfigDraft, ConfigError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.toml");
        fs::write(&path, contents).unwrap();
        ModelConfigDraft::load(&path)
    }

    #[test]
    fn model_types_round_trip_their_selectors() {
        for model_type in ModelType::ALL {
            assert_eq!(model_type.as_str().parse(), Ok(model_type));
        }

        let err = "LSTM".parse::<ModelType>().unwrap_err();
        assert_eq!(err.model_type, "LSTM");
    }

    #[test]
    fn freezing_fills_the_derived_fields() {
        let draft = load(DEEPONET).unwrap();
        assert_eq!(draft.model_type(), "DeepONet");

        let channels = Channels {
            input: 16,
            output: 20,
        };
        let config = draft.freeze(ModelType::DeepONet, channels).unwrap();

        assert_eq!((config.input_channel, config.output_channel), (16, 20));
        assert_eq!(config.weight_decay, 0.);
        assert_eq!(config.scheduler_step_size, 1);
        assert_eq!(config.snapshot_path(), Path::new("models/deeponet.safetensors"));
        assert_eq!(
            config.architecture,
            Architecture::DeepONet {
                dim_x: 1,
                hidden_size: 64,
                num_layers: 3
            }
        );
    }

    #[test]
    fn freezing_requires_the_architecture_keys() {
        let draft = load(DEEPONET).unwrap();
        let channels = Channels {
            input: 9,
            output: 6,
        };

        let err = draft.freeze(ModelType::Fno, channels).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { key: "modes", .. }));
    }

    #[test]
    fn rejects_invalid_hyperparameters() {
        let err = load(&DEEPONET.replace("epochs = 10", "epochs = 0")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "epochs", .. }));

        let err = load(&DEEPONET.replace("gamma = 0.9", "gamma = -1.0")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "gamma", .. }));
    }
}
