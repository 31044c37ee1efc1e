use ndarray::prelude::*;
use rand::Rng;

use super::{fno::FnoBackbone, reshape};
use crate::{
    Result,
    arch::{
        Model,
        layers::{Dense, GruStack},
        params::{BackIter, FrontIter, FrontIterMut},
    },
};

/// Fourier layers followed by a recurrent stack: the backbone mixes the whole sequence
/// in frequency space, the GRU then runs over its steps in order and a dense head maps
/// every hidden state to the output features.
#[derive(Clone)]
pub struct FnoGru {
    backbone: FnoBackbone,
    gru: GruStack,
    head: Dense,
}

impl FnoGru {
    /// Creates a new `FnoGru`.
    ///
    /// # Arguments
    /// * `fno_layers` - The amount of Fourier layers.
    /// * `gru_layers` - The amount of stacked GRU layers.
    /// * `fno_hidden` - The width of the Fourier layers.
    /// * `gru_hidden` - The hidden size of the GRU layers.
    /// * `modes` - The amount of Fourier modes kept by each layer.
    /// * `in_ch` - The amount of input features per time step.
    /// * `out_ch` - The amount of output features per time step.
    /// * `len` - The sequence length.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fno_layers: usize,
        gru_layers: usize,
        fno_hidden: usize,
        gru_hidden: usize,
        modes: usize,
        in_ch: usize,
        out_ch: usize,
        len: usize,
    ) -> Result<Self> {
        Ok(Self {
            backbone: FnoBackbone::new(in_ch, fno_hidden, fno_layers, modes, len)?,
            gru: GruStack::new(fno_hidden, gru_hidden, gru_layers)?,
            head: Dense::new((gru_hidden, out_ch), None),
        })
    }
}

impl Model for FnoGru {
    fn size(&self) -> usize {
        self.backbone.size() + self.gru.size() + self.head.size()
    }

    fn dims(&self) -> (usize, usize) {
        let len = self.backbone.seq_len();
        (len * self.backbone.channels().0, len * self.head.dim().1)
    }

    fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let mut front = FrontIterMut::new(params);
        self.backbone.init(front.take(self.backbone.size())?, rng)?;
        self.gru.init(front.take(self.gru.size())?, rng)?;
        self.head.init(front.take(self.head.size())?, rng)?;
        front.finish()
    }

    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let batch = x.nrows();
        let len = self.backbone.seq_len();
        let (hidden, out_ch) = self.head.dim();
        let mut front = FrontIter::new(params);

        let x = x.to_shape((batch, len, self.backbone.channels().0))?;
        let h = self
            .backbone
            .forward(front.take(self.backbone.size())?, x.view())?;
        let h = self.gru.forward(front.take(self.gru.size())?, h.view())?;
        let y = self.head.forward(
            front.take(self.head.size())?,
            reshape(h, (batch * len, hidden))?.view(),
        )?;
        front.finish()?;

        reshape(y, (batch, len * out_ch))
    }

    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()> {
        let batch = d.nrows();
        let len = self.backbone.seq_len();
        let (hidden, out_ch) = self.head.dim();
        let mut back = BackIter::new(params, grad)?;

        let (params, grad) = back.take(self.head.size())?;
        let dh = self
            .head
            .backward(params, grad, reshape(d, (batch * len, out_ch))?)?;

        let (params, grad) = back.take(self.gru.size())?;
        let dh = self
            .gru
            .backward(params, grad, reshape(dh, (batch, len, hidden))?)?;

        let (params, grad) = back.take(self.backbone.size())?;
        self.backbone.backward(params, grad, dh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_flattened_sequences() {
        let mut rng = crate::test::rng();
        let mut model = FnoGru::new(2, 2, 8, 6, 3, 9, 6, 5).unwrap();
        assert_eq!(model.dims(), (45, 30));

        let mut params = vec![0.; model.size()];
        model.init(&mut params, &mut rng).unwrap();
        let y = model.forward(&params, Array2::ones((2, 45)).view()).unwrap();
        assert_eq!(y.dim(), (2, 30));
    }

    #[test]
    fn gradients_match_finite_differences() {
        let model = FnoGru::new(1, 1, 3, 3, 2, 2, 2, 4).unwrap();
        crate::test::check_model_gradients(model, 2);
    }
}
