mod dense;
mod gru;
mod spectral;

pub use dense::Dense;
pub use gru::{Gru, GruStack};
pub use spectral::SpectralConv1d;
