use std::{num::NonZeroUsize, slice::Chunks};

use ndarray::Array2;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::dataset::Dataset;

/// Produces owned batches of a dataset, either reshuffling the rows on every epoch or
/// keeping them in their original order.
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: Dataset,
    batch_size: NonZeroUsize,
    order: Vec<usize>,
    rng: Option<StdRng>,
}

impl DataLoader {
    /// Creates a new `DataLoader` that reshuffles its rows every epoch.
    ///
    /// # Arguments
    /// * `dataset` - The dataset to draw the batches from.
    /// * `batch_size` - The maximum amount of rows per batch.
    /// * `seed` - The seed of the shuffling generator.
    pub fn shuffled(dataset: Dataset, batch_size: NonZeroUsize, seed: u64) -> Self {
        Self {
            order: (0..dataset.len()).collect(),
            dataset,
            batch_size,
            rng: Some(StdRng::seed_from_u64(seed)),
        }
    }

    /// Creates a new `DataLoader` that always yields the rows in their original order.
    ///
    /// # Arguments
    /// * `dataset` - The dataset to draw the batches from.
    /// * `batch_size` - The maximum amount of rows per batch.
    pub fn ordered(dataset: Dataset, batch_size: NonZeroUsize) -> Self {
        Self {
            order: (0..dataset.len()).collect(),
            dataset,
            batch_size,
            rng: None,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Returns the amount of batches in an epoch.
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size.get())
    }

    /// Starts a new epoch, reshuffling the rows if this loader is a shuffled one.
    ///
    /// # Returns
    /// An iterator over the epoch's `(x, y)` batches, the last one possibly shorter.
    pub fn epoch(&mut self) -> Batches<'_> {
        if let Some(rng) = &mut self.rng {
            self.order.shuffle(rng);
        }

        Batches {
            dataset: &self.dataset,
            chunks: self.order.chunks(self.batch_size.get()),
        }
    }
}

/// The batches of one epoch.
pub struct Batches<'a> {
    dataset: &'a Dataset,
    chunks: Chunks<'a, usize>,
}

impl Iterator for Batches<'_> {
    type Item = (Array2<f32>, Array2<f32>);

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks.next().map(|rows| self.dataset.rows(rows))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Batches<'_> {}

#[cfg(test)]
mod tests {
    use ndarray::Array;

    use super::*;

    fn dataset(len: usize) -> Dataset {
        let x = Array::from_shape_fn((len, 1), |(i, _)| i as f32);
        let y = Array::from_shape_fn((len, 1), |(i, _)| i as f32 + 100.);
        Dataset::new(x, y).unwrap()
    }

    fn epoch_rows(loader: &mut DataLoader) -> Vec<f32> {
        loader
            .epoch()
            .flat_map(|(x, _)| x.into_iter().collect::<Vec<_>>())
            .collect()
    }

    #[test]
    fn batches_respect_batch_size_and_alignment() {
        let mut loader = DataLoader::ordered(dataset(7), NonZeroUsize::new(3).unwrap());
        assert_eq!(loader.num_batches(), 3);

        let batches: Vec<_> = loader.epoch().collect();
        let sizes: Vec<_> = batches.iter().map(|(x, _)| x.nrows()).collect();
        assert_eq!(sizes, [3, 3, 1]);

        for (x, y) in &batches {
            assert_eq!(y - x, Array2::from_elem(x.raw_dim(), 100.));
        }
    }

    #[test]
    fn ordered_loader_keeps_its_order() {
        let mut loader = DataLoader::ordered(dataset(10), NonZeroUsize::new(4).unwrap());
        let expected: Vec<_> = (0..10).map(|i| i as f32).collect();

        assert_eq!(epoch_rows(&mut loader), expected);
        assert_eq!(epoch_rows(&mut loader), expected);
    }

    #[test]
    fn shuffled_loader_reshuffles_every_epoch() {
        let mut loader = DataLoader::shuffled(dataset(32), NonZeroUsize::new(5).unwrap(), 3);
        let first = epoch_rows(&mut loader);
        let second = epoch_rows(&mut loader);
        assert_ne!(first, second);

        let mut sorted = second.clone();
        sorted.sort_by(f32::total_cmp);
        assert_eq!(sorted, (0..32).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn shuffled_loaders_with_the_same_seed_agree() {
        let mut a = DataLoader::shuffled(dataset(16), NonZeroUsize::new(4).unwrap(), 9);
        let mut b = DataLoader::shuffled(dataset(16), NonZeroUsize::new(4).unwrap(), 9);

        for _ in 0..3 {
            assert_eq!(epoch_rows(&mut a), epoch_rows(&mut b));
        }
    }
}
