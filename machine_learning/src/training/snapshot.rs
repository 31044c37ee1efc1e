use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::{MlErr, Result};

const PARAMS: &str = "params";

/// Somewhere to persist the parameters of the best epoch.
pub trait Snapshot {
    /// Persists `params`, overwriting any previous snapshot.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `epoch` - The epoch that produced them.
    /// * `test_loss` - Their test loss.
    fn save(&mut self, params: &[f32], epoch: usize, test_loss: f32) -> Result<()>;
}

/// Writes the parameters as a single flat `f32` tensor named `params` in a safetensors
/// file, with the model type, epoch and test loss as metadata.
#[derive(Debug, Clone)]
pub struct SafetensorsSnapshot {
    path: PathBuf,
    model_type: String,
}

impl SafetensorsSnapshot {
    /// Creates a new `SafetensorsSnapshot`. The parent directory is created on the first save.
    ///
    /// # Arguments
    /// * `path` - The file to write.
    /// * `model_type` - The name of the model architecture.
    pub fn new(path: impl Into<PathBuf>, model_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            model_type: model_type.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Snapshot for SafetensorsSnapshot {
    fn save(&mut self, params: &[f32], epoch: usize, test_loss: f32) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let metadata = HashMap::from([
            ("model_type".to_string(), self.model_type.clone()),
            ("epoch".to_string(), epoch.to_string()),
            ("test_loss".to_string(), test_loss.to_string()),
        ]);

        let bytes: &[u8] = bytemuck::cast_slice(params);
        let view = TensorView::new(Dtype::F32, vec![params.len()], bytes)?;
        safetensors::serialize_to_file([(PARAMS, view)], &Some(metadata), &self.path)?;

        debug!(epoch = epoch, test_loss = test_loss; "saved snapshot to {}", self.path.display());
        Ok(())
    }
}

/// Reads a snapshot written by `SafetensorsSnapshot`.
///
/// # Arguments
/// * `path` - The snapshot file.
///
/// # Returns
/// The parameters and the snapshot's metadata.
pub fn load_params(path: &Path) -> Result<(Vec<f32>, HashMap<String, String>)> {
    let buffer = fs::read(path)?;
    let (_, metadata) = SafeTensors::read_metadata(&buffer)?;
    let tensors = SafeTensors::deserialize(&buffer)?;
    let tensor = tensors.tensor(PARAMS)?;

    if tensor.dtype() != Dtype::F32 {
        return Err(MlErr::InvalidSnapshot(format!(
            "expected f32 parameters, found {:?}",
            tensor.dtype()
        )));
    }

    let params = tensor
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    let metadata = metadata.metadata().clone().unwrap_or_default();
    Ok((params, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_keeps_params_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("fno.safetensors");
        let mut snapshot = SafetensorsSnapshot::new(&path, "FNO");

        snapshot.save(&[1., -2.5, 3.25], 1, 0.5).unwrap();
        snapshot.save(&[0.5, 0.25, -1.], 4, 0.125).unwrap();

        let (params, metadata) = load_params(&path).unwrap();
        assert_eq!(params, [0.5, 0.25, -1.]);
        assert_eq!(metadata["model_type"], "FNO");
        assert_eq!(metadata["epoch"], "4");
        assert_eq!(metadata["test_loss"], "0.125");
    }

    #[test]
    fn loading_a_missing_snapshot_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_params(&dir.path().join("nothing.safetensors")),
            Err(MlErr::Io(_))
        ));
    }
}
