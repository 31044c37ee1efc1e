use ndarray::prelude::*;
use rand::Rng;

use super::{DeepONet, reshape};
use crate::{
    MlErr, Result,
    arch::{
        Model,
        layers::{Dense, GruStack},
        params::{BackIter, FrontIter, FrontIterMut},
    },
};

/// A `DeepONet` whose output is read as `len` steps of `out_ch / len` features and
/// refined by a recurrent stack, with a dense head mapping every hidden state back to
/// the step features.
#[derive(Clone)]
pub struct DeepONetGru {
    deeponet: DeepONet,
    gru: GruStack,
    head: Dense,
    len: usize,
}

impl DeepONetGru {
    /// Creates a new `DeepONetGru`.
    ///
    /// # Arguments
    /// * `dim_x` - The dimension of a grid point.
    /// * `deeponet_layers` - The amount of dense layers in each of branch and trunk.
    /// * `gru_layers` - The amount of stacked GRU layers.
    /// * `deeponet_hidden` - The latent width of the operator.
    /// * `gru_hidden` - The hidden size of the GRU layers.
    /// * `in_ch` - The width of an input row.
    /// * `out_ch` - The width of an output row, a multiple of `len`.
    /// * `grid` - The `(L, dim_x)` grid the operator is evaluated at.
    /// * `len` - The amount of steps the output is split into.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dim_x: usize,
        deeponet_layers: usize,
        gru_layers: usize,
        deeponet_hidden: usize,
        gru_hidden: usize,
        in_ch: usize,
        out_ch: usize,
        grid: Array2<f32>,
        len: usize,
    ) -> Result<Self> {
        if len == 0 || out_ch % len != 0 {
            return Err(MlErr::InvalidArch(format!(
                "an output of width {out_ch} can't be split into {len} steps"
            )));
        }

        let step = out_ch / len;

        Ok(Self {
            deeponet: DeepONet::new(dim_x, deeponet_hidden, deeponet_layers, in_ch, out_ch, grid)?,
            gru: GruStack::new(step, gru_hidden, gru_layers)?,
            head: Dense::new((gru_hidden, step), None),
            len,
        })
    }
}

impl Model for DeepONetGru {
    fn size(&self) -> usize {
        self.deeponet.size() + self.gru.size() + self.head.size()
    }

    fn dims(&self) -> (usize, usize) {
        self.deeponet.dims()
    }

    fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let mut front = FrontIterMut::new(params);
        self.deeponet.init(front.take(self.deeponet.size())?, rng)?;
        self.gru.init(front.take(self.gru.size())?, rng)?;
        self.head.init(front.take(self.head.size())?, rng)?;
        front.finish()
    }

    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let batch = x.nrows();
        let (hidden, step) = self.head.dim();
        let mut front = FrontIter::new(params);

        let g = self
            .deeponet
            .forward(front.take(self.deeponet.size())?, x)?;
        let h = self.gru.forward(
            front.take(self.gru.size())?,
            reshape(g, (batch, self.len, step))?.view(),
        )?;
        let y = self.head.forward(
            front.take(self.head.size())?,
            reshape(h, (batch * self.len, hidden))?.view(),
        )?;
        front.finish()?;

        reshape(y, (batch, self.len * step))
    }

    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()> {
        let batch = d.nrows();
        let (hidden, step) = self.head.dim();
        let mut back = BackIter::new(params, grad)?;

        let (params, grad) = back.take(self.head.size())?;
        let dh = self
            .head
            .backward(params, grad, reshape(d, (batch * self.len, step))?)?;

        let (params, grad) = back.take(self.gru.size())?;
        let dg = self
            .gru
            .backward(params, grad, reshape(dh, (batch, self.len, hidden))?)?;

        let (params, grad) = back.take(self.deeponet.size())?;
        self.deeponet
            .backward(params, grad, reshape(dg, (batch, self.len * step))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(len: usize) -> Array2<f32> {
        Array::linspace(0., 1., len).insert_axis(Axis(1))
    }

    #[test]
    fn output_must_split_into_steps() {
        assert!(DeepONetGru::new(1, 2, 1, 8, 4, 6, 20, grid(6), 3).is_err());
        assert!(DeepONetGru::new(1, 2, 1, 8, 4, 6, 20, grid(6), 5).is_ok());
    }

    #[test]
    fn gradients_match_finite_differences() {
        let model = DeepONetGru::new(1, 2, 1, 3, 3, 4, 6, grid(4), 3).unwrap();
        crate::test::check_model_gradients(model, 2);
    }
}
