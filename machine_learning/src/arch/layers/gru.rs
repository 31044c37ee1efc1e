use ndarray::{concatenate, linalg, prelude::*};
use rand::Rng;

use crate::{
    MlErr, Result,
    arch::{
        activations::ActFn,
        init,
        params::{BackIter, FrontIter, FrontIterMut},
    },
};

/// What a single time step of the forward pass leaves behind for the backward pass.
#[derive(Clone)]
struct Step {
    x: Array2<f32>,
    h: Array2<f32>,
    r: Array2<f32>,
    z: Array2<f32>,
    n: Array2<f32>,
    hn: Array2<f32>,
}

type GruGrad<'a> = (
    ArrayViewMut2<'a, f32>,
    ArrayViewMut2<'a, f32>,
    ArrayViewMut1<'a, f32>,
    ArrayViewMut1<'a, f32>,
);

/// A gated recurrent unit layer unrolled over the time axis, starting from a zero
/// hidden state:
///
/// ```text
/// r  = σ(x·Wir + bir + h·Whr + bhr)
/// z  = σ(x·Wiz + biz + h·Whz + bhz)
/// n  = tanh(x·Win + bin + r ⊙ (h·Whn + bhn))
/// h' = (1 - z) ⊙ n + z ⊙ h
/// ```
///
/// Parameters are `w_i (in, 3h)`, `w_h (h, 3h)`, `b_i (3h)` and `b_h (3h)`, with the
/// gates stacked as (r, z, n) along the columns.
#[derive(Clone)]
pub struct Gru {
    input: usize,
    hidden: usize,
    steps: Vec<Step>,
}

impl Gru {
    /// Creates a new `Gru` layer.
    ///
    /// # Arguments
    /// * `input` - The amount of features per time step.
    /// * `hidden` - The size of the hidden state.
    pub fn new(input: usize, hidden: usize) -> Self {
        Self {
            input,
            hidden,
            steps: Vec::new(),
        }
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        3 * self.hidden * (self.input + self.hidden + 2)
    }

    /// Writes the initial parameters, `U(-1/√hidden, 1/√hidden)`.
    pub fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        self.check_len(params.len())?;
        let bound = 1. / (self.hidden as f32).sqrt();
        init::uniform(params, -bound, bound, rng)
    }

    /// Runs the recurrence over a batch of sequences.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `x` - The `(batch, len, input)` sequences.
    ///
    /// # Returns
    /// The `(batch, len, hidden)` hidden states.
    pub fn forward(&mut self, params: &[f32], x: ArrayView3<f32>) -> Result<Array3<f32>> {
        let (batch, len, input) = x.dim();
        if input != self.input {
            return Err(MlErr::SizeMismatch {
                what: "gru input",
                got: input,
                expected: self.input,
            });
        }

        let hd = self.hidden;
        let gate = ActFn::sigmoid();
        let (w_i, w_h, b_i, b_h) = self.view_params(params)?;
        let mut out = Array3::zeros((batch, len, hd));
        let mut h = Array2::zeros((batch, hd));
        self.steps.clear();

        for t in 0..len {
            let x_t = x.index_axis(Axis(1), t);
            let gi = x_t.dot(&w_i) + &b_i;
            let gh = h.dot(&w_h) + &b_h;

            let r = (&gi.slice(s![.., ..hd]) + &gh.slice(s![.., ..hd])).mapv(|v| gate.f(v));
            let z = (&gi.slice(s![.., hd..2 * hd]) + &gh.slice(s![.., hd..2 * hd]))
                .mapv(|v| gate.f(v));
            let hn = gh.slice(s![.., 2 * hd..]).to_owned();
            let n = (&gi.slice(s![.., 2 * hd..]) + &(&r * &hn)).mapv(f32::tanh);
            let h_next = &n + &(&z * &(&h - &n));

            out.index_axis_mut(Axis(1), t).assign(&h_next);
            self.steps.push(Step {
                x: x_t.to_owned(),
                h,
                r,
                z,
                n,
                hn,
            });
            h = h_next;
        }

        Ok(out)
    }

    /// Backpropagates through time, **adding** the parameter gradient to `grad`.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `grad` - This layer's gradient buffer.
    /// * `d` - The `(batch, len, hidden)` derivative of the loss with respect to every hidden state.
    ///
    /// # Returns
    /// The `(batch, len, input)` derivative of the loss with respect to the input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayView3<f32>,
    ) -> Result<Array3<f32>> {
        let (batch, len, hidden) = d.dim();
        if len != self.steps.len() || hidden != self.hidden {
            return Err(MlErr::SizeMismatch {
                what: "gru output derivative",
                got: len * hidden,
                expected: self.steps.len() * self.hidden,
            });
        }

        let (w_i, w_h, _, _) = self.view_params(params)?;
        let (mut dw_i, mut dw_h, mut db_i, mut db_h) = self.view_grad(grad)?;
        let mut dx = Array3::zeros((batch, len, self.input));
        let mut dh_next = Array2::zeros((batch, self.hidden));

        for (t, step) in self.steps.iter().enumerate().rev() {
            let dh = &d.index_axis(Axis(1), t) + &dh_next;

            let dn = &dh * &step.z.mapv(|z| 1. - z);
            let dz = &dh * &(&step.h - &step.n);
            let mut dh_prev = &dh * &step.z;

            let dn_pre = &dn * &step.n.mapv(|n| 1. - n * n);
            let dr_pre = &(&dn_pre * &step.hn) * &step.r.mapv(|r| r * (1. - r));
            let dz_pre = &dz * &step.z.mapv(|z| z * (1. - z));
            let dhn = &dn_pre * &step.r;

            let gi = concatenate(Axis(1), &[dr_pre.view(), dz_pre.view(), dn_pre.view()])?;
            let gh = concatenate(Axis(1), &[dr_pre.view(), dz_pre.view(), dhn.view()])?;

            linalg::general_mat_mul(1., &step.x.t(), &gi, 1., &mut dw_i);
            linalg::general_mat_mul(1., &step.h.t(), &gh, 1., &mut dw_h);
            db_i += &gi.sum_axis(Axis(0));
            db_h += &gh.sum_axis(Axis(0));

            dx.index_axis_mut(Axis(1), t).assign(&gi.dot(&w_i.t()));
            dh_prev += &gh.dot(&w_h.t());
            dh_next = dh_prev;
        }

        Ok(dx)
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.size() {
            return Err(MlErr::SizeMismatch {
                what: "gru parameters",
                got: len,
                expected: self.size(),
            });
        }

        Ok(())
    }

    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(
        ArrayView2<'a, f32>,
        ArrayView2<'a, f32>,
        ArrayView1<'a, f32>,
        ArrayView1<'a, f32>,
    )> {
        self.check_len(params.len())?;
        let gates = 3 * self.hidden;
        let (w_i, rest) = params.split_at(self.input * gates);
        let (w_h, rest) = rest.split_at(self.hidden * gates);
        let (b_i, b_h) = rest.split_at(gates);

        Ok((
            ArrayView2::from_shape((self.input, gates), w_i)?,
            ArrayView2::from_shape((self.hidden, gates), w_h)?,
            ArrayView1::from_shape(gates, b_i)?,
            ArrayView1::from_shape(gates, b_h)?,
        ))
    }

    fn view_grad<'a>(&self, grad: &'a mut [f32]) -> Result<GruGrad<'a>> {
        self.check_len(grad.len())?;
        let gates = 3 * self.hidden;
        let (w_i, rest) = grad.split_at_mut(self.input * gates);
        let (w_h, rest) = rest.split_at_mut(self.hidden * gates);
        let (b_i, b_h) = rest.split_at_mut(gates);

        Ok((
            ArrayViewMut2::from_shape((self.input, gates), w_i)?,
            ArrayViewMut2::from_shape((self.hidden, gates), w_h)?,
            ArrayViewMut1::from_shape(gates, b_i)?,
            ArrayViewMut1::from_shape(gates, b_h)?,
        ))
    }
}

/// Stacked `Gru` layers, each one consuming the hidden states of the previous one.
#[derive(Clone)]
pub struct GruStack {
    layers: Vec<Gru>,
}

impl GruStack {
    /// Creates a new `GruStack`.
    ///
    /// # Arguments
    /// * `input` - The amount of features per time step.
    /// * `hidden` - The hidden size of every layer.
    /// * `num_layers` - The amount of stacked layers, at least one.
    pub fn new(input: usize, hidden: usize, num_layers: usize) -> Result<Self> {
        if num_layers == 0 || hidden == 0 {
            return Err(MlErr::InvalidArch(format!(
                "a gru needs at least one layer and a non-empty hidden state, got {num_layers} layer(s) of size {hidden}"
            )));
        }

        let layers = (0..num_layers)
            .map(|i| Gru::new(if i == 0 { input } else { hidden }, hidden))
            .collect();

        Ok(Self { layers })
    }

    pub fn size(&self) -> usize {
        self.layers.iter().map(Gru::size).sum()
    }

    pub fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let mut front = FrontIterMut::new(params);

        for layer in &self.layers {
            layer.init(front.take(layer.size())?, rng)?;
        }

        front.finish()
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayView3<f32>) -> Result<Array3<f32>> {
        let mut front = FrontIter::new(params);
        let mut h: Option<Array3<f32>> = None;

        for layer in &mut self.layers {
            let input = h.as_ref().map_or(x, |prev| prev.view());
            h = Some(layer.forward(front.take(layer.size())?, input)?);
        }

        front.finish()?;
        h.ok_or_else(|| MlErr::InvalidArch("a gru stack needs at least one layer".into()))
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array3<f32>,
    ) -> Result<Array3<f32>> {
        let mut back = BackIter::new(params, grad)?;
        let mut d = d;

        for layer in self.layers.iter_mut().rev() {
            let (params, grad) = back.take(layer.size())?;
            d = layer.backward(params, grad, d.view())?;
        }

        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{assert_grad_close, numeric_grad, random_array3};

    #[test]
    fn zero_weights_keep_the_state_at_half_of_nothing() {
        // With every parameter at zero: r = z = 0.5, n = 0, so h stays at 0.
        let mut gru = Gru::new(2, 3);
        let params = vec![0.; gru.size()];
        let x = Array3::ones((2, 4, 2));

        let h = gru.forward(&params, x.view()).unwrap();
        assert_eq!(h.dim(), (2, 4, 3));
        assert!(h.iter().all(|&v| v == 0.));
    }

    #[test]
    fn an_empty_stack_is_an_error() {
        let mut stack = GruStack { layers: Vec::new() };
        let x = Array3::<f32>::ones((1, 2, 3));

        let err = stack.forward(&[], x.view()).unwrap_err();
        assert!(matches!(err, MlErr::InvalidArch(_)));
    }

    #[test]
    fn stack_sizes_add_up() {
        let stack = GruStack::new(2, 3, 2).unwrap();
        assert_eq!(stack.size(), Gru::new(2, 3).size() + Gru::new(3, 3).size());
        assert!(GruStack::new(2, 3, 0).is_err());
    }

    #[test]
    fn gradients_match_finite_differences() {
        let mut rng = crate::test::rng();
        let mut stack = GruStack::new(2, 3, 2).unwrap();
        let mut params = vec![0.; stack.size()];
        stack.init(&mut params, &mut rng).unwrap();

        let x = random_array3((2, 4, 2), &mut rng);
        let r = random_array3((2, 4, 3), &mut rng);

        stack.forward(&params, x.view()).unwrap();
        let mut grad = vec![0.; stack.size()];
        let dx = stack.backward(&params, &mut grad, r.clone()).unwrap();

        let numeric = numeric_grad(&params, |p| (stack.forward(p, x.view()).unwrap() * &r).sum());
        assert_grad_close(&grad, &numeric);

        let x_flat = x.iter().copied().collect::<Vec<_>>();
        let numeric_dx = numeric_grad(&x_flat, |x| {
            let x = ArrayView3::from_shape((2, 4, 2), x).unwrap();
            (stack.forward(&params, x).unwrap() * &r).sum()
        });
        assert_grad_close(dx.as_slice().unwrap(), &numeric_dx);
    }
}
