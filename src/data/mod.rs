pub mod npy;

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use log::info;
use machine_learning::dataset::Dataset;
use ndarray::Array2;

pub use npy::NpyError;

use crate::error::DatasetError;

/// Returns the (inputs, outputs) files of the dataset named `name`.
pub fn dataset_paths(dir: &Path, name: &str) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("inputs{name}.npy")),
        dir.join(format!("outputs{name}.npy")),
    )
}

/// Reads an `.npy` file as `f32` rows.
pub fn read_npy(path: &Path) -> Result<Array2<f32>, DatasetError> {
    let bytes = fs::read(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => DatasetError::Missing(path.to_path_buf()),
        _ => DatasetError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    npy::decode(&bytes).map_err(|source| DatasetError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the dataset named `name` from `dir`, pairing `inputs<name>.npy` with
/// `outputs<name>.npy` row by row.
///
/// # Arguments
/// * `dir` - The directory holding the dataset files.
/// * `name` - The dataset's base name.
///
/// # Returns
/// The dataset, or an error if a file is missing or malformed or the sample counts differ.
pub fn load_dataset(dir: &Path, name: &str) -> Result<Dataset, DatasetError> {
    let (inputs_path, outputs_path) = dataset_paths(dir, name);
    let inputs = read_npy(&inputs_path)?;
    let outputs = read_npy(&outputs_path)?;

    if inputs.nrows() != outputs.nrows() {
        return Err(DatasetError::LengthMismatch {
            inputs: inputs.nrows(),
            outputs: outputs.nrows(),
        });
    }

    let dataset = Dataset::new(inputs, outputs).map_err(DatasetError::Invalid)?;
    info!(
        samples = dataset.len(),
        x_size = dataset.x_size(),
        y_size = dataset.y_size();
        "loaded dataset {name}"
    );

    Ok(dataset)
}
