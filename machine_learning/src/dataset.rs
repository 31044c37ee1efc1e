use ndarray::{Array2, ArrayView2, Axis};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{MlErr, Result};

/// Row aligned inputs and expected outputs.
#[derive(Debug, Clone)]
pub struct Dataset {
    x: Array2<f32>,
    y: Array2<f32>,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `x` - The `(n, x_size)` inputs.
    /// * `y` - The `(n, y_size)` expected outputs.
    ///
    /// # Returns
    /// A new `Dataset`, or an error if the amount of rows differ or there are none.
    pub fn new(x: Array2<f32>, y: Array2<f32>) -> Result<Self> {
        if x.nrows() != y.nrows() {
            return Err(MlErr::SizeMismatch {
                what: "dataset outputs",
                got: y.nrows(),
                expected: x.nrows(),
            });
        }

        if x.nrows() == 0 {
            return Err(MlErr::EmptyDataset);
        }

        Ok(Self { x, y })
    }

    /// Returns the amount of samples.
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the width of an input row.
    pub fn x_size(&self) -> usize {
        self.x.ncols()
    }

    /// Returns the width of an output row.
    pub fn y_size(&self) -> usize {
        self.y.ncols()
    }

    pub fn x(&self) -> ArrayView2<'_, f32> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView2<'_, f32> {
        self.y.view()
    }

    /// Copies the given rows, in the given order.
    ///
    /// # Arguments
    /// * `rows` - The indices of the rows to copy.
    ///
    /// # Returns
    /// A tuple of (inputs, outputs).
    pub fn rows(&self, rows: &[usize]) -> (Array2<f32>, Array2<f32>) {
        (self.x.select(Axis(0), rows), self.y.select(Axis(0), rows))
    }

    /// Splits the dataset into a train and a test partition. The rows are permuted with a
    /// generator seeded by `seed`, the first `ceil(test_size * len)` of them go to the test
    /// partition and the rest to the train one.
    ///
    /// # Arguments
    /// * `test_size` - The fraction of the rows used for testing, in (0, 1).
    /// * `seed` - The seed of the permutation.
    ///
    /// # Returns
    /// A tuple of (train, test) datasets, or an error if either would be empty.
    pub fn split(&self, test_size: f64, seed: u64) -> Result<(Self, Self)> {
        let (train, test) = self.split_indices(test_size, seed)?;
        let (x_train, y_train) = self.rows(&train);
        let (x_test, y_test) = self.rows(&test);

        Ok((
            Self {
                x: x_train,
                y: y_train,
            },
            Self {
                x: x_test,
                y: y_test,
            },
        ))
    }

    /// Computes the (train, test) row indices `split` partitions the dataset with.
    pub fn split_indices(&self, test_size: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
        let len = self.len();
        let invalid = MlErr::InvalidSplit { test_size, len };

        if !(test_size > 0. && test_size < 1.) {
            return Err(invalid);
        }

        let n_test = (test_size * len as f64).ceil() as usize;
        if n_test == 0 || n_test >= len {
            return Err(invalid);
        }

        let mut indices: Vec<_> = (0..len).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));

        let train = indices.split_off(n_test);
        Ok((train, indices))
    }
}
