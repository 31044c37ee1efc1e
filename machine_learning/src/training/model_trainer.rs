use log::{debug, info};

use super::{History, Snapshot};
use crate::{
    MlErr, Result,
    arch::{Model, loss::LossFn},
    dataloader::DataLoader,
    optimization::{LrScheduler, Optimizer},
};

/// A model trainer. Contains the relevant components needed for training a model,
/// including the model itself.
pub struct ModelTrainer<M, O, S, L>
where
    M: Model,
    O: Optimizer,
    S: LrScheduler,
    L: LossFn,
{
    model: M,
    optimizer: O,
    scheduler: S,
    loss_fn: L,
    epochs: usize,
    grad: Vec<f32>,
}

impl<M, O, S, L> ModelTrainer<M, O, S, L>
where
    M: Model,
    O: Optimizer,
    S: LrScheduler,
    L: LossFn,
{
    /// Returns a new `ModelTrainer`.
    ///
    /// # Arguments
    /// * `model` - The model that will be trained.
    /// * `optimizer` - The optimizer that dictates how to update the parameters after every batch.
    /// * `scheduler` - The learning rate schedule, stepped after every epoch.
    /// * `loss_fn` - The loss function minimized during training.
    /// * `epochs` - The amount of passes over the training data.
    pub fn new(model: M, optimizer: O, scheduler: S, loss_fn: L, epochs: usize) -> Self {
        let grad = vec![0.; model.size()];

        Self {
            model,
            optimizer,
            scheduler,
            loss_fn,
            epochs,
            grad,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Trains the model for every configured epoch, evaluating it on the test data after
    /// each one and saving the parameters to `snapshot` whenever the test loss improves.
    ///
    /// # Arguments
    /// * `params` - The model's parameters, updated in place.
    /// * `train` - The training batches.
    /// * `test` - The evaluation batches.
    /// * `snapshot` - Where to persist the parameters of the best epoch.
    ///
    /// # Returns
    /// The losses of every epoch, or `MlErr::Diverged` as soon as one is not finite.
    pub fn train<P: Snapshot>(
        &mut self,
        params: &mut [f32],
        train: &mut DataLoader,
        test: &mut DataLoader,
        snapshot: &mut P,
    ) -> Result<History> {
        if params.len() != self.grad.len() {
            return Err(MlErr::SizeMismatch {
                what: "model parameters",
                got: params.len(),
                expected: self.grad.len(),
            });
        }

        let mut history = History::new();

        for epoch in 1..=self.epochs {
            let train_loss = self.train_epoch(params, train)?;
            let test_loss = Self::mean_loss(&mut self.model, params, test, &self.loss_fn)?;

            for loss in [train_loss, test_loss] {
                if !loss.is_finite() {
                    return Err(MlErr::Diverged { epoch, loss });
                }
            }

            info!(
                epoch = epoch,
                train_loss = train_loss,
                test_loss = test_loss,
                learning_rate = self.optimizer.learning_rate();
                "epoch {epoch}/{} done", self.epochs
            );

            if history.push(train_loss, test_loss) {
                snapshot.save(params, epoch, test_loss)?;
            }

            self.scheduler.step(&mut self.optimizer);
        }

        Ok(history)
    }

    /// Computes the loss of the model over every batch of `loader`, weighting each batch
    /// by its amount of rows.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `loader` - The batches to evaluate on.
    /// * `loss_fn` - The loss function to evaluate, not necessarily the trained one.
    ///
    /// # Returns
    /// The mean loss per sample.
    pub fn evaluate<E: LossFn>(
        &mut self,
        params: &[f32],
        loader: &mut DataLoader,
        loss_fn: &E,
    ) -> Result<f32> {
        Self::mean_loss(&mut self.model, params, loader, loss_fn)
    }

    fn mean_loss<E: LossFn>(
        model: &mut M,
        params: &[f32],
        loader: &mut DataLoader,
        loss_fn: &E,
    ) -> Result<f32> {
        let mut total = 0.;
        let mut rows = 0;

        for (x, y) in loader.epoch() {
            let y_pred = model.forward(params, x.view())?;
            total += loss_fn.loss(y_pred.view(), y.view()) * x.nrows() as f32;
            rows += x.nrows();
        }

        Ok(total / rows.max(1) as f32)
    }

    fn train_epoch(&mut self, params: &mut [f32], loader: &mut DataLoader) -> Result<f32> {
        let mut total = 0.;
        let mut rows = 0;

        for (i, (x, y)) in loader.epoch().enumerate() {
            self.grad.fill(0.);

            let y_pred = self.model.forward(params, x.view())?;
            let loss = self.loss_fn.loss(y_pred.view(), y.view());
            let d = self.loss_fn.loss_prime(y_pred.view(), y.view());

            self.model.backward(params, &mut self.grad, d)?;
            self.optimizer.update_params(params, &self.grad)?;

            debug!(batch = i, loss = loss; "batch done");
            total += loss * x.nrows() as f32;
            rows += x.nrows();
        }

        Ok(total / rows.max(1) as f32)
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use ndarray::{Array, Array2};

    use super::*;
    use crate::{
        arch::{Sequential, activations::ActFn, loss::Mse},
        dataset::Dataset,
        optimization::{Adam, StepLr},
    };

    #[derive(Default)]
    struct Saved(Vec<(usize, f32)>);

    impl Snapshot for Saved {
        fn save(&mut self, _: &[f32], epoch: usize, test_loss: f32) -> Result<()> {
            self.0.push((epoch, test_loss));
            Ok(())
        }
    }

    struct Mlp(Sequential);

    impl Model for Mlp {
        fn size(&self) -> usize {
            self.0.size()
        }

        fn dims(&self) -> (usize, usize) {
            self.0.dims()
        }

        fn init<R: rand::Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
            self.0.init(params, rng)
        }

        fn forward(
            &mut self,
            params: &[f32],
            x: ndarray::ArrayView2<f32>,
        ) -> Result<Array2<f32>> {
            self.0.forward(params, x)
        }

        fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()> {
            self.0.backward(params, grad, d).map(|_| ())
        }
    }

    fn loaders() -> (DataLoader, DataLoader) {
        let x = Array::linspace(-1., 1., 40).insert_axis(ndarray::Axis(1));
        let y = x.mapv(|x: f32| 0.5 * x * x - 0.25);
        let (train, test) = Dataset::new(x, y).unwrap().split(0.25, 0).unwrap();
        let batch_size = NonZeroUsize::new(8).unwrap();

        (
            DataLoader::shuffled(train, batch_size, 1),
            DataLoader::ordered(test, batch_size),
        )
    }

    #[test]
    fn training_reduces_the_loss_and_saves_improvements() {
        let mut rng = crate::test::rng();
        let model = Mlp(Sequential::mlp(&[1, 16, 16, 1], ActFn::gelu()).unwrap());
        let mut params = vec![0.; model.size()];
        model.init(&mut params, &mut rng).unwrap();

        let optimizer = Adam::with_defaults(params.len(), 1e-2, 0.);
        let mut trainer = ModelTrainer::new(model, optimizer, StepLr::new(50, 0.5), Mse, 150);
        let (mut train, mut test) = loaders();
        let mut saved = Saved::default();

        let history = trainer
            .train(&mut params, &mut train, &mut test, &mut saved)
            .unwrap();

        assert_eq!(history.epochs(), 150);
        let first = history.train_loss()[0];
        let (last, _) = history.last().unwrap();
        assert!(last < first / 4., "{first} -> {last}");

        let (best_epoch, best_loss) = history.best().unwrap();
        assert_eq!(saved.0.last(), Some(&(best_epoch, best_loss)));
        assert!(saved.0.windows(2).all(|w| w[1].1 < w[0].1));
    }

    #[test]
    fn non_finite_losses_abort_training() {
        let model = Mlp(Sequential::mlp(&[1, 1], ActFn::gelu()).unwrap());
        let params_len = model.size();
        let mut params = vec![f32::NAN; params_len];

        let optimizer = Adam::with_defaults(params_len, 1e-2, 0.);
        let mut trainer = ModelTrainer::new(model, optimizer, StepLr::new(1, 1.), Mse, 3);
        let (mut train, mut test) = loaders();
        let mut saved = Saved::default();

        let err = trainer
            .train(&mut params, &mut train, &mut test, &mut saved)
            .unwrap_err();

        assert!(matches!(err, MlErr::Diverged { epoch: 1, .. }));
        assert!(saved.0.is_empty());
    }
}
