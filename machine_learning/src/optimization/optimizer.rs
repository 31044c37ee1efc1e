use crate::Result;

pub trait Optimizer {
    /// Updates the parameters according to the algorithm's learning rule.
    ///
    /// # Arguments
    /// * `params` - The parameters that are going to be modified.
    /// * `grad` - The gradient used for taking the step, as long as `params`.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()>;

    /// Returns the current learning rate.
    fn learning_rate(&self) -> f32;

    /// Overrides the learning rate used by the following updates.
    fn set_learning_rate(&mut self, learning_rate: f32);
}
