use std::path::{Path, PathBuf};

use log::info;
use machine_learning::{
    arch::{
        Model,
        loss::{Mse, RelL2},
    },
    dataloader::DataLoader,
    optimization::{Adam, StepLr},
    training::{History, ModelTrainer, SafetensorsSnapshot},
};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    configs::{ModelConfigDraft, ModelType, SimulationConfig},
    data,
    error::{DatasetError, PipelineError},
    factory,
    report::{self, ReportPaths},
};

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub model_type: ModelType,
    pub parameters: usize,
    pub history: History,
    pub test_rel_l2: f32,
    /// The snapshot of the best parameters.
    pub snapshot: PathBuf,
    pub report: ReportPaths,
}

/// Runs a whole training session: loads both configs, the dataset and the model they
/// describe, trains it and reports how it went.
///
/// # Arguments
/// * `sim_path` - The simulation config file.
/// * `model_path` - The model config file.
///
/// # Returns
/// The outcome of the run, or the first error found. Every error is fatal.
pub fn run(sim_path: &Path, model_path: &Path) -> Result<TrainOutcome, PipelineError> {
    let sim = SimulationConfig::load(sim_path)?;
    let draft = ModelConfigDraft::load(model_path)?;

    if sim.device != draft.device() {
        return Err(PipelineError::DeviceMismatch {
            simulation: sim.device,
            model: draft.device(),
        });
    }

    if !sim.device.is_cpu() {
        return Err(PipelineError::DeviceUnavailable(sim.device));
    }

    info!("using device {}", sim.device);

    // Config errors abort before the dataset is read, an unknown selector only after it.
    let selector = draft.model_type().parse::<ModelType>();
    let config = match selector {
        Ok(model_type) => Ok(draft.freeze(model_type, factory::channels(model_type, &sim))?),
        Err(e) => Err(e),
    };

    let dataset = data::load_dataset(&sim.dataset_dir, &sim.dataset_filename)?;
    let (train, test) = dataset
        .split(sim.test_size, sim.random_state)
        .map_err(DatasetError::Invalid)?;

    info!(train = train.len(), test = test.len(); "split dataset");

    let config = config?;
    let model_type = config.model_type;

    let model = factory::build(&config, &sim).map_err(PipelineError::Model)?;
    let (x_size, y_size) = model.dims();

    for (what, got, expected) in [
        ("inputs", train.x_size(), x_size),
        ("outputs", train.y_size(), y_size),
    ] {
        if got != expected {
            return Err(DatasetError::FeatureMismatch {
                what,
                got,
                expected,
            }
            .into());
        }
    }

    let mut rng = StdRng::seed_from_u64(sim.random_state);
    let mut params = vec![0.; model.size()];
    model
        .init(&mut params, &mut rng)
        .map_err(PipelineError::Model)?;

    info!(
        model_type = model_type.as_str(),
        parameters = params.len(),
        input_channel = config.input_channel,
        output_channel = config.output_channel;
        "built {model_type} model"
    );

    let mut train = DataLoader::shuffled(train, sim.batch_size, sim.random_state.wrapping_add(1));
    let mut test = DataLoader::ordered(test, sim.batch_size);

    let optimizer = Adam::with_defaults(params.len(), config.learning_rate, config.weight_decay);
    let scheduler = StepLr::new(config.scheduler_step_size, config.gamma);
    let mut snapshot = SafetensorsSnapshot::new(config.snapshot_path(), model_type.as_str());

    let mut trainer = ModelTrainer::new(model, optimizer, scheduler, Mse, config.epochs);
    let history = trainer
        .train(&mut params, &mut train, &mut test, &mut snapshot)
        .map_err(PipelineError::Training)?;

    let test_rel_l2 = trainer
        .evaluate(&params, &mut test, &RelL2::new())
        .map_err(PipelineError::Training)?;

    let report = report::report(
        model_type,
        params.len(),
        &history,
        test_rel_l2,
        &config.report_dir,
        &config.model_filename,
    )
    .map_err(PipelineError::Report)?;

    Ok(TrainOutcome {
        model_type,
        parameters: params.len(),
        history,
        test_rel_l2,
        snapshot: snapshot.path().to_path_buf(),
        report,
    })
}
