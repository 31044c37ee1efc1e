use super::Optimizer;

/// Adjusts an optimizer's learning rate between epochs.
pub trait LrScheduler {
    /// Called once at the end of every epoch.
    fn step<O: Optimizer>(&mut self, optimizer: &mut O);
}

/// Multiplies the learning rate by `gamma` every `step_size` epochs.
#[derive(Debug, Clone)]
pub struct StepLr {
    step_size: usize,
    gamma: f32,
    epoch: usize,
}

impl StepLr {
    /// Creates a new `StepLr`. A `step_size` of 0 is treated as 1.
    pub fn new(step_size: usize, gamma: f32) -> Self {
        Self {
            step_size: step_size.max(1),
            gamma,
            epoch: 0,
        }
    }
}

impl LrScheduler for StepLr {
    fn step<O: Optimizer>(&mut self, optimizer: &mut O) {
        self.epoch += 1;

        if self.epoch % self.step_size == 0 {
            optimizer.set_learning_rate(optimizer.learning_rate() * self.gamma);
        }
    }
}
