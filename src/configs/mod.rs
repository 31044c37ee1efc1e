mod device;
mod model;
mod simulation;

use std::{fs, path::Path};

use serde::de::DeserializeOwned;

pub use device::Device;
pub use model::{Architecture, Channels, ModelConfig, ModelConfigDraft, ModelType};
pub use simulation::SimulationConfig;

use crate::error::ConfigError;

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
