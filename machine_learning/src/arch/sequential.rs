use ndarray::{Array2, ArrayView2};
use rand::Rng;

use super::{
    activations::ActFn,
    layers::Dense,
    params::{BackIter, FrontIter, FrontIterMut},
};
use crate::{MlErr, Result};

/// A sequential stack of dense layers: information flows forward when computing an output
/// and backward when computing the *deltas* of its layers.
#[derive(Clone)]
pub struct Sequential {
    layers: Vec<Dense>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Dense>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    /// Creates a multilayer perceptron going through every width in `dims`, applying
    /// `act_fn` after every layer but the last one.
    ///
    /// # Arguments
    /// * `dims` - The widths, input first. There must be at least two.
    /// * `act_fn` - The hidden activation function.
    pub fn mlp(dims: &[usize], act_fn: ActFn) -> Result<Self> {
        if dims.len() < 2 || dims.contains(&0) {
            return Err(MlErr::InvalidArch(format!(
                "a perceptron needs at least two non-zero widths, got {dims:?}"
            )));
        }

        let last = dims.len() - 2;
        let layers = dims
            .windows(2)
            .enumerate()
            .map(|(i, w)| Dense::new((w[0], w[1]), (i != last).then_some(act_fn)));

        Ok(Self::new(layers))
    }

    /// Returns the amount of parameters in the stack.
    pub fn size(&self) -> usize {
        self.layers.iter().map(Dense::size).sum()
    }

    /// Returns the (input, output) widths of the stack.
    pub fn dims(&self) -> (usize, usize) {
        let input = self.layers.first().map_or(0, |l| l.dim().0);
        let output = self.layers.last().map_or(0, |l| l.dim().1);
        (input, output)
    }

    pub fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let mut front = FrontIterMut::new(params);

        for layer in &self.layers {
            layer.init(front.take(layer.size())?, rng)?;
        }

        front.finish()
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `params` - The parameters of the whole stack.
    /// * `x` - The input data.
    ///
    /// # Returns
    /// The prediction for the given input or an error if occurred.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut front = FrontIter::new(params);
        let mut a = x.to_owned();

        for layer in &mut self.layers {
            a = layer.forward(front.take(layer.size())?, a.view())?;
        }

        front.finish()?;
        Ok(a)
    }

    /// Makes a backward pass through the network, **adding** every layer's gradient to `grad`.
    ///
    /// # Arguments
    /// * `params` - The parameters of the whole stack.
    /// * `grad` - The gradient buffer of the whole stack.
    /// * `d` - The derivative of the loss with respect to the output.
    ///
    /// # Returns
    /// The derivative of the loss with respect to the input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        let mut back = BackIter::new(params, grad)?;

        for layer in self.layers.iter_mut().rev() {
            let (params, grad) = back.take(layer.size())?;
            d = layer.backward(params, grad, d)?;
        }

        Ok(d)
    }
}
