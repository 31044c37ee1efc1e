use std::f32::consts::TAU;

use ndarray::{Zip, linalg, prelude::*};
use rand::Rng;

use crate::{MlErr, Result, arch::init};

/// A 1D spectral convolution: transforms each channel to its lowest `modes` Fourier
/// modes, mixes channels with complex weights per mode, and transforms back.
///
/// The truncated real DFT and its inverse are precomputed as `(modes, len)` cosine and
/// sine bases, so both passes are plain matrix products. Modes above the truncation are
/// zero, which is the same as an inverse real FFT over a zero-padded spectrum.
///
/// Parameters are the real part of the `(modes, in, out)` weights followed by the
/// imaginary part.
#[derive(Clone)]
pub struct SpectralConv1d {
    in_ch: usize,
    out_ch: usize,
    modes: usize,
    len: usize,

    fwd_cos: Array2<f32>,
    fwd_sin: Array2<f32>,
    inv_cos: Array2<f32>,
    inv_sin: Array2<f32>,

    // Forward metadata, (batch, modes, in)
    x_re: Array3<f32>,
    x_im: Array3<f32>,
}

impl SpectralConv1d {
    /// Creates a new `SpectralConv1d`.
    ///
    /// # Arguments
    /// * `in_ch` - The amount of input channels.
    /// * `out_ch` - The amount of output channels.
    /// * `modes` - The amount of Fourier modes kept, at most `len / 2 + 1`.
    /// * `len` - The length of the sequences this layer transforms.
    pub fn new(in_ch: usize, out_ch: usize, modes: usize, len: usize) -> Result<Self> {
        if modes == 0 || modes > len / 2 + 1 {
            return Err(MlErr::InvalidArch(format!(
                "{modes} Fourier modes requested for sequences of length {len}, expected between 1 and {}",
                len / 2 + 1
            )));
        }

        let theta = |k: usize, t: usize| TAU * ((k * t) % len) as f32 / len as f32;
        let fwd_cos = Array2::from_shape_fn((modes, len), |(k, t)| theta(k, t).cos());
        let fwd_sin = Array2::from_shape_fn((modes, len), |(k, t)| theta(k, t).sin());

        // The DC and Nyquist modes appear once in the spectrum, every other mode twice.
        let scale = |k: usize| {
            if k == 0 || 2 * k == len {
                1. / len as f32
            } else {
                2. / len as f32
            }
        };
        let inv_cos = Array2::from_shape_fn((modes, len), |(k, t)| scale(k) * fwd_cos[(k, t)]);
        let inv_sin = Array2::from_shape_fn((modes, len), |(k, t)| scale(k) * fwd_sin[(k, t)]);

        let empty = Array3::zeros((0, modes, in_ch));

        Ok(Self {
            in_ch,
            out_ch,
            modes,
            len,
            fwd_cos,
            fwd_sin,
            inv_cos,
            inv_sin,
            x_re: empty.clone(),
            x_im: empty,
        })
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        2 * self.modes * self.in_ch * self.out_ch
    }

    /// Writes the initial parameters, `U(0, 1) / (in * out)`.
    pub fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        self.check_len(params.len())?;
        let scale = 1. / (self.in_ch * self.out_ch) as f32;
        init::uniform(params, 0., scale, rng)
    }

    /// Makes a forward pass through the layer.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `x` - The `(batch, len, in)` input.
    ///
    /// # Returns
    /// The `(batch, len, out)` output.
    pub fn forward(&mut self, params: &[f32], x: ArrayView3<f32>) -> Result<Array3<f32>> {
        let (batch, len, in_ch) = x.dim();
        if (len, in_ch) != (self.len, self.in_ch) {
            return Err(MlErr::SizeMismatch {
                what: "spectral convolution input",
                got: len * in_ch,
                expected: self.len * self.in_ch,
            });
        }

        let (w_re, w_im) = self.view_params(params)?;
        let mut x_re = Array3::zeros((batch, self.modes, self.in_ch));
        let mut x_im = Array3::zeros((batch, self.modes, self.in_ch));

        let (fwd_cos, fwd_sin) = (&self.fwd_cos, &self.fwd_sin);
        Zip::from(x_re.outer_iter_mut())
            .and(x_im.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut re, mut im, xb| {
                re.assign(&fwd_cos.dot(&xb));
                im.assign(&fwd_sin.dot(&xb).mapv(|v| -v));
            });

        let mut y_re = Array3::zeros((batch, self.modes, self.out_ch));
        let mut y_im = Array3::zeros((batch, self.modes, self.out_ch));

        for k in 0..self.modes {
            let xr = x_re.index_axis(Axis(1), k);
            let xi = x_im.index_axis(Axis(1), k);
            let wr = w_re.index_axis(Axis(0), k);
            let wi = w_im.index_axis(Axis(0), k);

            y_re.index_axis_mut(Axis(1), k)
                .assign(&(xr.dot(&wr) - xi.dot(&wi)));
            y_im.index_axis_mut(Axis(1), k)
                .assign(&(xr.dot(&wi) + xi.dot(&wr)));
        }

        let mut y = Array3::zeros((batch, self.len, self.out_ch));
        let (inv_cos, inv_sin) = (&self.inv_cos, &self.inv_sin);
        Zip::from(y.outer_iter_mut())
            .and(y_re.outer_iter())
            .and(y_im.outer_iter())
            .par_for_each(|mut yb, re, im| {
                yb.assign(&(inv_cos.t().dot(&re) - inv_sin.t().dot(&im)));
            });

        self.x_re = x_re;
        self.x_im = x_im;
        Ok(y)
    }

    /// Makes a backward pass through the layer, **adding** the parameter gradient to `grad`.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `grad` - This layer's gradient buffer.
    /// * `d` - The `(batch, len, out)` derivative of the loss with respect to the output.
    ///
    /// # Returns
    /// The `(batch, len, in)` derivative of the loss with respect to the input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayView3<f32>,
    ) -> Result<Array3<f32>> {
        let batch = d.len_of(Axis(0));
        if d.dim() != (self.x_re.len_of(Axis(0)), self.len, self.out_ch) {
            return Err(MlErr::SizeMismatch {
                what: "spectral convolution output derivative",
                got: d.len(),
                expected: self.x_re.len_of(Axis(0)) * self.len * self.out_ch,
            });
        }

        let (w_re, w_im) = self.view_params(params)?;
        let (mut dw_re, mut dw_im) = self.view_grad(grad)?;

        let mut dy_re = Array3::zeros((batch, self.modes, self.out_ch));
        let mut dy_im = Array3::zeros((batch, self.modes, self.out_ch));
        let (inv_cos, inv_sin) = (&self.inv_cos, &self.inv_sin);
        Zip::from(dy_re.outer_iter_mut())
            .and(dy_im.outer_iter_mut())
            .and(d.outer_iter())
            .par_for_each(|mut re, mut im, db| {
                re.assign(&inv_cos.dot(&db));
                im.assign(&inv_sin.dot(&db).mapv(|v| -v));
            });

        let mut dx_re = Array3::zeros((batch, self.modes, self.in_ch));
        let mut dx_im = Array3::zeros((batch, self.modes, self.in_ch));

        for k in 0..self.modes {
            let xr = self.x_re.index_axis(Axis(1), k);
            let xi = self.x_im.index_axis(Axis(1), k);
            let dyr = dy_re.index_axis(Axis(1), k);
            let dyi = dy_im.index_axis(Axis(1), k);
            let wr = w_re.index_axis(Axis(0), k);
            let wi = w_im.index_axis(Axis(0), k);

            let mut dwr = dw_re.index_axis_mut(Axis(0), k);
            linalg::general_mat_mul(1., &xr.t(), &dyr, 1., &mut dwr);
            linalg::general_mat_mul(1., &xi.t(), &dyi, 1., &mut dwr);

            let mut dwi = dw_im.index_axis_mut(Axis(0), k);
            linalg::general_mat_mul(1., &xr.t(), &dyi, 1., &mut dwi);
            linalg::general_mat_mul(-1., &xi.t(), &dyr, 1., &mut dwi);

            dx_re
                .index_axis_mut(Axis(1), k)
                .assign(&(dyr.dot(&wr.t()) + dyi.dot(&wi.t())));
            dx_im
                .index_axis_mut(Axis(1), k)
                .assign(&(dyi.dot(&wr.t()) - dyr.dot(&wi.t())));
        }

        let mut dx = Array3::zeros((batch, self.len, self.in_ch));
        let (fwd_cos, fwd_sin) = (&self.fwd_cos, &self.fwd_sin);
        Zip::from(dx.outer_iter_mut())
            .and(dx_re.outer_iter())
            .and(dx_im.outer_iter())
            .par_for_each(|mut dxb, re, im| {
                dxb.assign(&(fwd_cos.t().dot(&re) - fwd_sin.t().dot(&im)));
            });

        Ok(dx)
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.size() {
            return Err(MlErr::SizeMismatch {
                what: "spectral convolution parameters",
                got: len,
                expected: self.size(),
            });
        }

        Ok(())
    }

    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(ArrayView3<'a, f32>, ArrayView3<'a, f32>)> {
        self.check_len(params.len())?;
        let shape = (self.modes, self.in_ch, self.out_ch);
        let (re, im) = params.split_at(self.size() / 2);
        Ok((ArrayView3::from_shape(shape, re)?, ArrayView3::from_shape(shape, im)?))
    }

    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut3<'a, f32>, ArrayViewMut3<'a, f32>)> {
        self.check_len(grad.len())?;
        let shape = (self.modes, self.in_ch, self.out_ch);
        let (re, im) = grad.split_at_mut(self.size() / 2);
        Ok((
            ArrayViewMut3::from_shape(shape, re)?,
            ArrayViewMut3::from_shape(shape, im)?,
        ))
    }
}
