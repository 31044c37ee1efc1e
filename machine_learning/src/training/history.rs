/// The per epoch losses of a training run, epochs numbered from 1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    train_loss: Vec<f32>,
    test_loss: Vec<f32>,
    best: Option<(usize, f32)>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the losses of the next epoch.
    ///
    /// # Returns
    /// Whether the test loss is the lowest one so far.
    pub fn push(&mut self, train_loss: f32, test_loss: f32) -> bool {
        self.train_loss.push(train_loss);
        self.test_loss.push(test_loss);

        let improved = self.best.is_none_or(|(_, best)| test_loss < best);
        if improved {
            self.best = Some((self.epochs(), test_loss));
        }

        improved
    }

    /// Returns the amount of recorded epochs.
    pub fn epochs(&self) -> usize {
        self.train_loss.len()
    }

    pub fn train_loss(&self) -> &[f32] {
        &self.train_loss
    }

    pub fn test_loss(&self) -> &[f32] {
        &self.test_loss
    }

    /// Returns the epoch with the lowest test loss and that loss.
    pub fn best(&self) -> Option<(usize, f32)> {
        self.best
    }

    /// Returns the losses of the last epoch, as (train, test).
    pub fn last(&self) -> Option<(f32, f32)> {
        Some((*self.train_loss.last()?, *self.test_loss.last()?))
    }
}
