mod history;
mod model_trainer;
mod snapshot;

pub use history::History;
pub use model_trainer::ModelTrainer;
pub use snapshot::{SafetensorsSnapshot, Snapshot, load_params};
