use ndarray::{Array2, ArrayView2};
use rand::Rng;

use crate::Result;

/// A trainable model over flat parameters. The model owns its structure and forward
/// metadata, the parameters and their gradient are owned by whoever trains it.
pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Returns the widths of one input row and one output row.
    fn dims(&self) -> (usize, usize);

    /// Writes the initial parameters.
    ///
    /// # Arguments
    /// * `params` - A buffer of exactly `size()` parameters.
    /// * `rng` - The random number generator to sample from.
    fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()>;

    /// Makes a forward pass, keeping whatever the following `backward` needs.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - A `(batch, dims().0)` input.
    ///
    /// # Returns
    /// The `(batch, dims().1)` prediction.
    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Backpropagates the derivative of the loss with respect to the last prediction,
    /// **adding** the gradient of every parameter to `grad`.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `grad` - A buffer as long as `params`.
    /// * `d` - The derivative of the loss with respect to the last prediction.
    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()>;
}
