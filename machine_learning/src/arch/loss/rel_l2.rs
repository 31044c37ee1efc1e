use ndarray::{Array2, ArrayView2, Axis, Zip};

use super::LossFn;

const EPS: f32 = 1e-12;

/// Relative L2 error, averaged over the rows of the batch: `mean(||y_pred - y|| / ||y||)`.
#[derive(Default, Clone, Copy)]
pub struct RelL2;

impl RelL2 {
    /// Returns a new `RelL2`.
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for RelL2 {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let rows = y.nrows().max(1) as f32;

        Zip::from(y_pred.rows())
            .and(y.rows())
            .fold(0., |acc, yp, y| {
                let err = (&yp - &y).mapv(|e| e.powi(2)).sum().sqrt();
                let norm = y.mapv(|v| v.powi(2)).sum().sqrt().max(EPS);
                acc + err / norm
            })
            / rows
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let rows = y.nrows().max(1) as f32;
        let mut d = &y_pred - &y;

        for (mut d_row, y_row) in d.axis_iter_mut(Axis(0)).zip(y.axis_iter(Axis(0))) {
            let err = d_row.mapv(|e| e.powi(2)).sum().sqrt().max(EPS);
            let norm = y_row.mapv(|v| v.powi(2)).sum().sqrt().max(EPS);
            d_row.mapv_inplace(|e| e / (err * norm * rows));
        }

        d
    }
}
