pub mod activations;
pub(crate) mod init;
pub mod layers;
pub mod loss;
mod model;
pub mod models;
pub mod params;
mod sequential;

pub use model::Model;
pub use models::Surrogate;
pub use sequential::Sequential;
