use super::Optimizer;
use crate::{MlErr, Result};

/// The Adam optimization algorithm, with weight decay applied as an L2 penalty added to
/// the gradient.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    weight_decay: f32,
    beta1: f32,
    beta2: f32,
    beta1_t: f32,
    beta2_t: f32,
    v: Box<[f32]>,
    s: Box<[f32]>,
    epsilon: f32,
}

impl Adam {
    pub const BETA1: f32 = 0.9;
    pub const BETA2: f32 = 0.999;
    pub const EPSILON: f32 = 1e-8;

    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `weight_decay` - The coefficient of the L2 penalty.
    /// * `beta1`, `beta2`, `epsilon` - Hyperparameters to the optimization algorithm.
    ///
    /// # Returns
    /// A new `Adam` instance.
    pub fn new(
        len: usize,
        learning_rate: f32,
        weight_decay: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    ) -> Self {
        Self {
            learning_rate,
            weight_decay,
            beta1,
            beta2,
            beta1_t: 1.,
            beta2_t: 1.,
            v: vec![0.; len].into_boxed_slice(),
            s: vec![0.; len].into_boxed_slice(),
            epsilon,
        }
    }

    /// Creates a new `Adam` optimizer with the usual `beta1`, `beta2` and `epsilon`.
    pub fn with_defaults(len: usize, learning_rate: f32, weight_decay: f32) -> Self {
        Self::new(
            len,
            learning_rate,
            weight_decay,
            Self::BETA1,
            Self::BETA2,
            Self::EPSILON,
        )
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        if grad.len() != params.len() || params.len() != self.v.len() {
            return Err(MlErr::SizeMismatch {
                what: "optimizer gradient",
                got: grad.len(),
                expected: self.v.len(),
            });
        }

        let Self {
            learning_rate: lr,
            weight_decay: wd,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            ..
        } = *self;

        self.beta1_t *= b1;
        self.beta2_t *= b2;

        let bc1 = 1. - self.beta1_t;
        let bc2 = 1. - self.beta2_t;
        let step_size = lr / bc1;
        let bc2_sqrt = bc2.sqrt();

        params
            .iter_mut()
            .zip(grad)
            .zip(self.v.iter_mut())
            .zip(self.s.iter_mut())
            .for_each(|(((p, &g), v), s)| {
                let g = g + wd * *p;
                *v = b1 * *v + (1. - b1) * g;
                *s = b2 * *s + (1. - b2) * g.powi(2);
                *p -= step_size * *v / (s.sqrt() / bc2_sqrt + eps);
            });

        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_moves_every_parameter_by_the_learning_rate() {
        let mut adam = Adam::with_defaults(3, 0.1, 0.);
        let mut params = [1., 2., 3.];
        adam.update_params(&mut params, &[0.5, -2., 1e3]).unwrap();

        for (p, expected) in params.iter().zip([0.9, 2.1, 2.9]) {
            assert!((p - expected).abs() < 1e-5, "{p} != {expected}");
        }
    }

    #[test]
    fn weight_decay_pulls_towards_zero() {
        let mut adam = Adam::with_defaults(2, 0.1, 1.);
        let mut params = [1., -1.];
        adam.update_params(&mut params, &[0., 0.]).unwrap();

        assert!(params[0] < 1. && params[1] > -1.);
    }

    #[test]
    fn rejects_mismatched_gradients() {
        let mut adam = Adam::with_defaults(2, 0.1, 0.);
        assert!(adam.update_params(&mut [0., 0.], &[0.]).is_err());
        assert!(adam.update_params(&mut [0.], &[0.]).is_err());
    }
}
