//! Wait-time estimation: a linear model over urgency, queue size, peak hour and
//! availability, pre-trained on synthetic data and adapted from observed waits.

pub mod model;
#[allow(clippy::module_inception)]
pub mod predictor;

pub use model::{features, is_peak_hour, LinearModel, Observation, PredictionInput};
pub use predictor::{ModelMetrics, WaitTimePredictor};
