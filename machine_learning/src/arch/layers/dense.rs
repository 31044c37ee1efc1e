use ndarray::{linalg, prelude::*};
use rand::Rng;

use crate::{MlErr, Result, arch::activations::ActFn, arch::init};

/// A fully connected layer, `a = act_fn(x · w + b)`.
///
/// The parameters are laid out as the row-major `(dim.0, dim.1)` weights followed by
/// the `dim.1` biases.
#[derive(Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    x: Array2<f32>,
    z: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The (input, output) dimensions of the layer.
    /// * `act_fn` - The activation function to apply to the output, if any.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        let zeros = Array2::zeros((0, 0));

        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            x: zeros.clone(),
            z: zeros,
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the (input, output) dimensions of this layer.
    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Writes the initial parameters, sampled from `U(-1/√fan_in, 1/√fan_in)`.
    pub fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        self.check_len(params.len())?;
        let bound = 1. / (self.dim.0.max(1) as f32).sqrt();
        init::uniform(params, -bound, bound, rng)
    }

    /// Makes a forward pass through the layer.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `x` - The `(batch, dim.0)` input.
    ///
    /// # Returns
    /// The `(batch, dim.1)` output.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense layer input",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let mut z = x.dot(&w);
        z += &b;

        self.x = x.to_owned();

        let Some(act_fn) = self.act_fn else {
            return Ok(z);
        };

        let a = z.mapv(|z| act_fn.f(z));
        self.z = z;
        Ok(a)
    }

    /// Makes a backward pass through the layer, **adding** the parameter gradient to `grad`.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `grad` - This layer's gradient buffer.
    /// * `d` - The derivative of the loss with respect to this layer's output.
    ///
    /// # Returns
    /// The derivative of the loss with respect to this layer's input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &self.x.t(), &d, 1.0, &mut dw);
        db += &d.sum_axis(Axis(0));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.size {
            return Err(MlErr::SizeMismatch {
                what: "dense layer parameters",
                got: len,
                expected: self.size,
            });
        }

        Ok(())
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    ///
    /// # Arguments
    /// * `grad` - A gradient slice.
    ///
    /// # Returns
    /// A tuple containing the delta weights and delta biases.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len(grad.len())?;
        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    ///
    /// # Arguments
    /// * `params` - A slice of parameters.
    ///
    /// # Returns
    /// A tuple containing the weights and biases.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len(params.len())?;
        let w_size = self.size - self.dim.1;
        let weights = ArrayView2::from_shape(self.dim, &params[..w_size])?;
        let biases = ArrayView1::from_shape(self.dim.1, &params[w_size..])?;
        Ok((weights, biases))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::test::{assert_grad_close, numeric_grad, random_array};

    #[test]
    fn forward_computes_affine_map() {
        let mut dense = Dense::new((2, 1), None);
        let params = [1., 2., 0.5];
        let x = array![[1., 1.], [2., 0.]];

        let y = dense.forward(&params, x.view()).unwrap();
        assert_eq!(y, array![[3.5], [2.5]]);
    }

    #[test]
    fn rejects_wrong_input_width() {
        let mut dense = Dense::new((3, 1), None);
        let params = [0.; 4];
        let x = array![[1., 1.]];

        assert!(dense.forward(&params, x.view()).is_err());
    }

    #[test]
    fn gradients_match_finite_differences() {
        let mut dense = Dense::new((3, 4), Some(ActFn::gelu()));
        let mut rng = crate::test::rng();
        let mut params = vec![0.; dense.size()];
        dense.init(&mut params, &mut rng).unwrap();

        let x = random_array((5, 3), &mut rng);
        let r = random_array((5, 4), &mut rng);

        dense.forward(&params, x.view()).unwrap();
        let mut grad = vec![0.; dense.size()];
        let dx = dense.backward(&params, &mut grad, r.clone()).unwrap();

        let numeric = numeric_grad(&params, |p| {
            (dense.forward(p, x.view()).unwrap() * &r).sum()
        });
        assert_grad_close(&grad, &numeric);

        let x_flat = x.iter().copied().collect::<Vec<_>>();
        let numeric_dx = numeric_grad(&x_flat, |x| {
            let x = ArrayView2::from_shape((5, 3), x).unwrap();
            (dense.forward(&params, x).unwrap() * &r).sum()
        });
        assert_grad_close(dx.as_slice().unwrap(), &numeric_dx);
    }
}
