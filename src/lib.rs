//! Trains neural-operator surrogates of a robotic manipulator's forward dynamics.
//!
//! A run reads a simulation config and a model config, loads the matching `.npy`
//! dataset, builds the selected architecture, trains it and reports how it went.

pub mod configs;
pub mod data;
pub mod error;
pub mod factory;
pub mod pipeline;
pub mod report;

pub use error::PipelineError;
pub use pipeline::{TrainOutcome, run};
