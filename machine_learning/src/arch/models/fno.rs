use ndarray::prelude::*;
use rand::Rng;

use super::reshape;
use crate::{
    MlErr, Result,
    arch::{
        Model, Sequential,
        activations::ActFn,
        layers::{Dense, SpectralConv1d},
        params::{BackIter, FrontIter, FrontIterMut},
    },
};

/// One Fourier layer, `a = act(K(x) + W·x)`, where `K` is a spectral convolution
/// and `W` a pointwise linear map shared by every time step.
#[derive(Clone)]
struct FourierBlock {
    spectral: SpectralConv1d,
    pointwise: Dense,
    act_fn: Option<ActFn>,

    // Forward metadata
    z: Array3<f32>,
}

impl FourierBlock {
    fn size(&self) -> usize {
        self.spectral.size() + self.pointwise.size()
    }

    fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let mut front = FrontIterMut::new(params);
        self.spectral.init(front.take(self.spectral.size())?, rng)?;
        self.pointwise.init(front.take(self.pointwise.size())?, rng)?;
        front.finish()
    }

    fn forward(&mut self, params: &[f32], x: ArrayView3<f32>) -> Result<Array3<f32>> {
        let (batch, len, ch) = x.dim();
        let mut front = FrontIter::new(params);
        let spectral = front.take(self.spectral.size())?;
        let pointwise = front.take(self.pointwise.size())?;
        front.finish()?;

        let x_steps = x.to_shape((batch * len, ch))?;
        let w = self.pointwise.forward(pointwise, x_steps.view())?;
        let z = self.spectral.forward(spectral, x)? + reshape(w, (batch, len, ch))?;

        let Some(act_fn) = self.act_fn else {
            return Ok(z);
        };

        let a = z.mapv(|z| act_fn.f(z));
        self.z = z;
        Ok(a)
    }

    fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array3<f32>,
    ) -> Result<Array3<f32>> {
        let (batch, len, ch) = d.dim();
        let mut back = BackIter::new(params, grad)?;
        let (pointwise_params, pointwise_grad) = back.take(self.pointwise.size())?;
        let (spectral_params, spectral_grad) = back.take(self.spectral.size())?;

        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let dx_spectral = self
            .spectral
            .backward(spectral_params, spectral_grad, d.view())?;

        let d_steps = reshape(d, (batch * len, ch))?;
        let dx_pointwise = self
            .pointwise
            .backward(pointwise_params, pointwise_grad, d_steps)?;

        Ok(dx_spectral + reshape(dx_pointwise, (batch, len, ch))?)
    }
}

/// The lifting layer followed by the Fourier layers. Maps `(batch, len, in)` sequences
/// to `(batch, len, hidden)` ones.
#[derive(Clone)]
pub struct FnoBackbone {
    lift: Dense,
    blocks: Vec<FourierBlock>,
    len: usize,
}

impl FnoBackbone {
    /// Creates a new `FnoBackbone`.
    ///
    /// # Arguments
    /// * `in_ch` - The amount of features per time step.
    /// * `hidden` - The width of every Fourier layer.
    /// * `num_layers` - The amount of Fourier layers, the last one without activation.
    /// * `modes` - The amount of Fourier modes kept by each layer.
    /// * `len` - The sequence length.
    pub fn new(
        in_ch: usize,
        hidden: usize,
        num_layers: usize,
        modes: usize,
        len: usize,
    ) -> Result<Self> {
        if num_layers == 0 || hidden == 0 || in_ch == 0 {
            return Err(MlErr::InvalidArch(format!(
                "an fno needs at least one layer, inputs and a non-empty width, got {num_layers} layer(s) of width {hidden} over {in_ch} input(s)"
            )));
        }

        let blocks = (0..num_layers)
            .map(|i| {
                Ok(FourierBlock {
                    spectral: SpectralConv1d::new(hidden, hidden, modes, len)?,
                    pointwise: Dense::new((hidden, hidden), None),
                    act_fn: (i + 1 < num_layers).then(ActFn::gelu),
                    z: Array3::zeros((0, 0, 0)),
                })
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            lift: Dense::new((in_ch, hidden), None),
            blocks,
            len,
        })
    }

    pub fn size(&self) -> usize {
        self.lift.size() + self.blocks.iter().map(FourierBlock::size).sum::<usize>()
    }

    /// Returns the amount of features per time step, (input, output).
    pub fn channels(&self) -> (usize, usize) {
        self.lift.dim()
    }

    pub fn seq_len(&self) -> usize {
        self.len
    }

    pub fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let mut front = FrontIterMut::new(params);
        self.lift.init(front.take(self.lift.size())?, rng)?;

        for block in &self.blocks {
            block.init(front.take(block.size())?, rng)?;
        }

        front.finish()
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayView3<f32>) -> Result<Array3<f32>> {
        let (batch, len, in_ch) = x.dim();
        let hidden = self.lift.dim().1;
        let mut front = FrontIter::new(params);

        let x_steps = x.to_shape((batch * len, in_ch))?;
        let lifted = self
            .lift
            .forward(front.take(self.lift.size())?, x_steps.view())?;
        let mut h = reshape(lifted, (batch, len, hidden))?;

        for block in &mut self.blocks {
            h = block.forward(front.take(block.size())?, h.view())?;
        }

        front.finish()?;
        Ok(h)
    }

    /// Backpropagates through the Fourier layers and the lift. The derivative with respect
    /// to the input is not needed by anything upstream, so it is not returned.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array3<f32>,
    ) -> Result<()> {
        let (batch, len, _) = d.dim();
        let mut back = BackIter::new(params, grad)?;

        for block in self.blocks.iter_mut().rev() {
            let (params, grad) = back.take(block.size())?;
            d = block.backward(params, grad, d)?;
        }

        let hidden = self.lift.dim().1;
        let (params, grad) = back.take(self.lift.size())?;
        self.lift
            .backward(params, grad, reshape(d, (batch * len, hidden))?)?;

        Ok(())
    }
}

/// A Fourier neural operator over sequences of `len` time steps, each row holding the
/// steps one after the other. A two layer head projects every step to the output width.
#[derive(Clone)]
pub struct Fno {
    backbone: FnoBackbone,
    head: Sequential,
}

impl Fno {
    /// Creates a new `Fno`.
    ///
    /// # Arguments
    /// * `hidden` - The width of the Fourier layers and the head.
    /// * `num_layers` - The amount of Fourier layers.
    /// * `modes` - The amount of Fourier modes kept by each layer.
    /// * `in_ch` - The amount of input features per time step.
    /// * `out_ch` - The amount of output features per time step.
    /// * `len` - The sequence length.
    pub fn new(
        hidden: usize,
        num_layers: usize,
        modes: usize,
        in_ch: usize,
        out_ch: usize,
        len: usize,
    ) -> Result<Self> {
        Ok(Self {
            backbone: FnoBackbone::new(in_ch, hidden, num_layers, modes, len)?,
            head: Sequential::mlp(&[hidden, hidden, out_ch], ActFn::gelu())?,
        })
    }
}

impl Model for Fno {
    fn size(&self) -> usize {
        self.backbone.size() + self.head.size()
    }

    fn dims(&self) -> (usize, usize) {
        let len = self.backbone.seq_len();
        (len * self.backbone.channels().0, len * self.head.dims().1)
    }

    fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let mut front = FrontIterMut::new(params);
        self.backbone.init(front.take(self.backbone.size())?, rng)?;
        self.head.init(front.take(self.head.size())?, rng)?;
        front.finish()
    }

    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let batch = x.nrows();
        let len = self.backbone.seq_len();
        let (in_ch, hidden) = self.backbone.channels();
        let mut front = FrontIter::new(params);

        let x = x.to_shape((batch, len, in_ch))?;
        let h = self
            .backbone
            .forward(front.take(self.backbone.size())?, x.view())?;

        let y = self.head.forward(
            front.take(self.head.size())?,
            reshape(h, (batch * len, hidden))?.view(),
        )?;
        front.finish()?;

        reshape(y, (batch, len * self.head.dims().1))
    }

    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()> {
        let batch = d.nrows();
        let len = self.backbone.seq_len();
        let hidden = self.backbone.channels().1;
        let mut back = BackIter::new(params, grad)?;

        let d = reshape(d, (batch * len, self.head.dims().1))?;
        let (params, grad) = back.take(self.head.size())?;
        let dh = self.head.backward(params, grad, d)?;

        let (params, grad) = back.take(self.backbone.size())?;
        self.backbone
            .backward(params, grad, reshape(dh, (batch, len, hidden))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_flattened_sequences() {
        let mut rng = crate::test::rng();
        let mut model = Fno::new(8, 2, 3, 9, 6, 5).unwrap();
        assert_eq!(model.dims(), (45, 30));

        let mut params = vec![0.; model.size()];
        model.init(&mut params, &mut rng).unwrap();
        let y = model.forward(&params, Array2::ones((2, 45)).view()).unwrap();
        assert_eq!(y.dim(), (2, 30));
    }

    #[test]
    fn rejects_too_many_modes() {
        assert!(Fno::new(8, 2, 4, 9, 6, 5).is_err());
        assert!(Fno::new(8, 0, 3, 9, 6, 5).is_err());
    }

    #[test]
    fn gradients_match_finite_differences() {
        let model = Fno::new(4, 2, 2, 2, 2, 4).unwrap();
        crate::test::check_model_gradients(model, 2);
    }
}
