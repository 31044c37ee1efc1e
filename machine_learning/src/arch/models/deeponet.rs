use ndarray::{linalg, prelude::*};
use rand::Rng;

use crate::{
    MlErr, Result,
    arch::{
        Model, Sequential,
        activations::ActFn,
        layers::Dense,
        params::{BackIter, FrontIter, FrontIterMut},
    },
};

/// A deep operator network evaluated on a fixed spatial grid.
///
/// The branch net encodes the input function, the trunk net encodes every grid point and
/// the operator output is their inner product plus a scalar bias, `G = B·Tᵀ + b0`. A
/// dense projection then maps the `L` grid values to the output width.
///
/// Parameters are laid out as branch, trunk, bias and projection.
#[derive(Clone)]
pub struct DeepONet {
    branch: Sequential,
    trunk: Sequential,
    projection: Dense,
    grid: Array2<f32>,

    // Forward metadata
    b: Array2<f32>,
    t: Array2<f32>,
}

impl DeepONet {
    /// Creates a new `DeepONet`.
    ///
    /// # Arguments
    /// * `dim_x` - The dimension of a grid point.
    /// * `hidden` - The latent width shared by the branch and trunk outputs.
    /// * `num_layers` - The amount of dense layers in each of branch and trunk.
    /// * `in_ch` - The width of an input row.
    /// * `out_ch` - The width of an output row.
    /// * `grid` - The `(L, dim_x)` grid the operator is evaluated at.
    pub fn new(
        dim_x: usize,
        hidden: usize,
        num_layers: usize,
        in_ch: usize,
        out_ch: usize,
        grid: Array2<f32>,
    ) -> Result<Self> {
        if grid.ncols() != dim_x {
            return Err(MlErr::InvalidArch(format!(
                "the grid has points of dimension {}, but dim_x is {dim_x}",
                grid.ncols()
            )));
        }

        if grid.nrows() == 0 || num_layers == 0 || out_ch == 0 {
            return Err(MlErr::InvalidArch(format!(
                "a deeponet needs a non-empty grid, at least one layer and an output, got {} point(s), {num_layers} layer(s) and {out_ch} output(s)",
                grid.nrows()
            )));
        }

        let widths = |first| {
            let mut dims = vec![first];
            dims.extend(std::iter::repeat_n(hidden, num_layers));
            dims
        };

        Ok(Self {
            branch: Sequential::mlp(&widths(in_ch), ActFn::gelu())?,
            trunk: Sequential::mlp(&widths(dim_x), ActFn::gelu())?,
            projection: Dense::new((grid.nrows(), out_ch), None),
            grid,
            b: Array2::zeros((0, 0)),
            t: Array2::zeros((0, 0)),
        })
    }
}

impl Model for DeepONet {
    fn size(&self) -> usize {
        self.branch.size() + self.trunk.size() + 1 + self.projection.size()
    }

    fn dims(&self) -> (usize, usize) {
        (self.branch.dims().0, self.projection.dim().1)
    }

    fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let mut front = FrontIterMut::new(params);
        self.branch.init(front.take(self.branch.size())?, rng)?;
        self.trunk.init(front.take(self.trunk.size())?, rng)?;
        front.take(1)?.fill(0.);
        self.projection
            .init(front.take(self.projection.size())?, rng)?;
        front.finish()
    }

    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut front = FrontIter::new(params);
        let branch_params = front.take(self.branch.size())?;
        let trunk_params = front.take(self.trunk.size())?;
        let bias = front.take(1)?[0];
        let projection_params = front.take(self.projection.size())?;
        front.finish()?;

        self.b = self.branch.forward(branch_params, x)?;
        self.t = self.trunk.forward(trunk_params, self.grid.view())?;

        let g = self.b.dot(&self.t.t()) + bias;
        self.projection.forward(projection_params, g.view())
    }

    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()> {
        let mut back = BackIter::new(params, grad)?;

        let (projection_params, projection_grad) = back.take(self.projection.size())?;
        let dg = self
            .projection
            .backward(projection_params, projection_grad, d)?;

        let (_, bias_grad) = back.take(1)?;
        bias_grad[0] += dg.sum();

        let mut dt = Array2::zeros(self.t.raw_dim());
        linalg::general_mat_mul(1., &dg.t(), &self.b, 0., &mut dt);
        let db = dg.dot(&self.t);

        let (trunk_params, trunk_grad) = back.take(self.trunk.size())?;
        self.trunk.backward(trunk_params, trunk_grad, dt)?;

        let (branch_params, branch_grad) = back.take(self.branch.size())?;
        self.branch.backward(branch_params, branch_grad, db)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(len: usize) -> Array2<f32> {
        Array::linspace(0., 1., len).insert_axis(Axis(1))
    }

    #[test]
    fn maps_rows_to_the_output_width() {
        let mut rng = crate::test::rng();
        let mut model = DeepONet::new(1, 8, 2, 16, 20, grid(16)).unwrap();
        assert_eq!(model.dims(), (16, 20));

        let mut params = vec![0.; model.size()];
        model.init(&mut params, &mut rng).unwrap();
        let y = model.forward(&params, Array2::ones((3, 16)).view()).unwrap();
        assert_eq!(y.dim(), (3, 20));
    }

    #[test]
    fn grid_must_match_the_point_dimension() {
        assert!(DeepONet::new(2, 8, 2, 16, 20, grid(16)).is_err());
        assert!(DeepONet::new(1, 8, 0, 16, 20, grid(16)).is_err());
    }

    #[test]
    fn gradients_match_finite_differences() {
        let model = DeepONet::new(1, 4, 2, 5, 3, grid(5)).unwrap();
        crate::test::check_model_gradients(model, 3);
    }
}
