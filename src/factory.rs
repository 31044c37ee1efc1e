use machine_learning::{
    Result,
    arch::{
        Surrogate,
        models::{DeepONet, DeepONetGru, Fno, FnoGru},
    },
};
use ndarray::Array2;

use crate::configs::{Architecture, Channels, ModelConfig, ModelType, SimulationConfig};

/// The spatial grid the DeepONet variants are evaluated at: `0, h, 2h, ...` up to, but
/// excluding, the horizon `D`, with `h = dt / (3 * dof)`. The points are computed in double
/// precision and stored as a `(L, 1)` column.
pub fn spatial_grid(sim: &SimulationConfig) -> Array2<f32> {
    let step = sim.dt / (3 * sim.dof) as f64;
    let len = (sim.horizon / step).ceil() as usize;

    Array2::from_shape_fn((len, 1), |(i, _)| (i as f64 * step) as f32)
}

/// Derives the input and output widths of `model_type` from the simulation.
pub fn channels(model_type: ModelType, sim: &SimulationConfig) -> Channels {
    let dof = sim.dof;

    if model_type.uses_grid() {
        Channels {
            input: spatial_grid(sim).nrows(),
            output: sim.samples * 2 * dof,
        }
    } else {
        Channels {
            input: 3 * dof,
            output: 2 * dof,
        }
    }
}

/// Builds the model a frozen config describes.
///
/// # Arguments
/// * `config` - The model config.
/// * `sim` - The simulation config, which sets the sequence length and the grid.
///
/// # Returns
/// The model, or an error if the hyperparameters don't describe a valid architecture.
pub fn build(config: &ModelConfig, sim: &SimulationConfig) -> Result<Surrogate> {
    let (in_ch, out_ch) = (config.input_channel, config.output_channel);
    let len = sim.samples;

    let model = match config.architecture {
        Architecture::DeepONet {
            dim_x,
            hidden_size,
            num_layers,
        } => DeepONet::new(
            dim_x,
            hidden_size,
            num_layers,
            in_ch,
            out_ch,
            spatial_grid(sim),
        )?
        .into(),
        Architecture::Fno {
            hidden_size,
            num_layers,
            modes,
        } => Fno::new(hidden_size, num_layers, modes, in_ch, out_ch, len)?.into(),
        Architecture::FnoGru {
            fno_num_layers,
            gru_num_layers,
            fno_hidden_size,
            gru_hidden_size,
            modes,
        } => FnoGru::new(
            fno_num_layers,
            gru_num_layers,
            fno_hidden_size,
            gru_hidden_size,
            modes,
            in_ch,
            out_ch,
            len,
        )?
        .into(),
        Architecture::DeepONetGru {
            dim_x,
            deeponet_num_layers,
            gru_num_layers,
            deeponet_hidden_size,
            gru_hidden_size,
        } => DeepONetGru::new(
            dim_x,
            deeponet_num_layers,
            gru_num_layers,
            deeponet_hidden_size,
            gru_hidden_size,
            in_ch,
            out_ch,
            spatial_grid(sim),
            len,
        )?
        .into(),
    };

    Ok(model)
}

#[cfg(test)]
mod tests {
    use std::{num::NonZeroUsize, path::PathBuf};

    use machine_learning::arch::Model;

    use super::*;
    use crate::configs::Device;

    fn sim(dof: usize, samples: usize) -> SimulationConfig {
        SimulationConfig {
            device: Device::Cpu,
            dataset_filename: "Test".into(),
            dataset_dir: PathBuf::from("datasets"),
            random_state: 0,
            test_size: 0.2,
            batch_size: NonZeroUsize::new(4).unwrap(),
            dof,
            dt: 0.75,
            horizon: 2.0,
            samples,
        }
    }

    fn config(
        model_type: ModelType,
        channels: Channels,
        architecture: Architecture,
    ) -> ModelConfig {
        ModelConfig {
            model_type,
            device: Device::Cpu,
            model_filename: "model".into(),
            model_dir: PathBuf::from("models"),
            report_dir: PathBuf::from("."),
            epochs: 1,
            learning_rate: 1e-3,
            weight_decay: 0.,
            gamma: 1.,
            scheduler_step_size: 1,
            input_channel: channels.input,
            output_channel: channels.output,
            architecture,
        }
    }

    #[test]
    fn grid_matches_arange() {
        // dt / (3 * dof) = 0.125, so [0, 2) holds 16 points.
        let grid = spatial_grid(&sim(2, 5));
        assert_eq!(grid.dim(), (16, 1));
        assert_eq!(grid[(1, 0)], 0.125);
        assert_eq!(grid[(15, 0)], 1.875);
    }

    #[test]
    fn deeponet_channels_follow_the_grid() {
        let sim = sim(2, 5);
        let channels = channels(ModelType::DeepONet, &sim);
        assert_eq!(
            channels,
            Channels {
                input: 16,
                output: 20
            }
        );

        let architecture = Architecture::DeepONet {
            dim_x: 1,
            hidden_size: 8,
            num_layers: 2,
        };
        let model = build(&config(ModelType::DeepONet, channels, architecture), &sim).unwrap();
        assert_eq!(model.name(), "DeepONet");
        assert_eq!(model.dims(), (16, 20));
    }

    #[test]
    fn fno_channels_follow_the_degrees_of_freedom() {
        let sim = sim(3, 5);
        let channels = channels(ModelType::Fno, &sim);
        assert_eq!(
            channels,
            Channels {
                input: 9,
                output: 6
            }
        );
        assert_eq!(channels, super::channels(ModelType::FnoGru, &sim));

        let architecture = Architecture::FnoGru {
            fno_num_layers: 1,
            gru_num_layers: 1,
            fno_hidden_size: 4,
            gru_hidden_size: 4,
            modes: 2,
        };
        let model = build(&config(ModelType::FnoGru, channels, architecture), &sim).unwrap();
        assert_eq!(model.dims(), (45, 30));
    }

    #[test]
    fn deeponet_gru_splits_the_output_into_samples() {
        let sim = sim(1, 4);
        let channels = channels(ModelType::DeepONetGru, &sim);
        let architecture = Architecture::DeepONetGru {
            dim_x: 1,
            deeponet_num_layers: 2,
            gru_num_layers: 1,
            deeponet_hidden_size: 4,
            gru_hidden_size: 3,
        };

        let model = build(&config(ModelType::DeepONetGru, channels, architecture), &sim).unwrap();
        assert_eq!(model.name(), "DeepONet+GRU");
        assert_eq!(model.dims(), (channels.input, 8));
    }

    #[test]
    fn invalid_hyperparameters_fail_to_build() {
        let sim = sim(3, 5);
        let channels = channels(ModelType::Fno, &sim);
        let architecture = Architecture::Fno {
            hidden_size: 4,
            num_layers: 2,
            modes: 10,
        };

        assert!(build(&config(ModelType::Fno, channels, architecture), &sim).is_err());
    }
}
