//! Online wait-time predictor.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::PredictorConfig;
use crate::core::{MetricEvent, SharedMetricsSink};
use crate::predictor::model::{features, is_peak_hour, urgency_scale, LinearModel, Observation, PredictionInput};
use crate::util::serde::Urgency;

/// Fit quality of the linear part over the current window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Mean absolute error.
    pub mae: f64,
    /// Root mean squared error.
    pub rmse: f64,
    /// Coefficient of determination.
    pub r2: f64,
}

const MIN_PREDICTION: f64 = 1.0;
const MIN_SYNTHETIC_WAIT: f64 = 5.0;
const CONVERGED_MSE: f64 = 0.1;
const DEFAULT_VARIANCE: f64 = 10.0;
const METRICS_MIN_POINTS: usize = 10;

/// Linear wait-time model trained on synthetic data, then adapted online.
pub struct WaitTimePredictor {
    model: LinearModel,
    window: VecDeque<Observation>,
    window_size: usize,
    learning_rate: f64,
    metrics: Option<SharedMetricsSink>,
}

impl WaitTimePredictor {
    /// Build and pre-train a predictor.
    pub fn new(config: &PredictorConfig) -> Self {
        let mut predictor = Self {
            model: LinearModel::default(),
            window: VecDeque::with_capacity(config.window_size.min(1024)),
            window_size: config.window_size,
            learning_rate: config.learning_rate,
            metrics: None,
        };
        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..config.synthetic_samples {
            let obs = synthetic_observation(&mut rng);
            predictor.push(obs);
        }
        let epochs = predictor.train(config.training_epochs);
        tracing::debug!(
            seed,
            epochs,
            samples = predictor.window.len(),
            "wait-time predictor trained"
        );
        predictor
    }

    /// Attach a metrics sink for `publish_metrics`.
    pub fn with_metrics(mut self, sink: SharedMetricsSink) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Predicted wait for `input`. Never below 1.0.
    pub fn predict(&self, input: &PredictionInput) -> f64 {
        let linear = self.model.linear(&features(input));
        (linear * urgency_scale(input.urgency)).max(MIN_PREDICTION)
    }

    /// Learn from an observed wait: append to the window, then one gradient
    /// step against the residual of the full prediction.
    pub fn update(&mut self, observation: Observation) {
        self.push(observation);
        let predicted = self.predict(&observation.input);
        let error = observation.actual_wait - predicted;
        self.model
            .step(&features(&observation.input), error, self.learning_rate);
        tracing::debug!(
            urgency = %observation.input.urgency,
            actual = observation.actual_wait,
            predicted,
            "predictor updated"
        );
    }

    /// 95% interval around `prediction` from the spread of observed waits.
    pub fn confidence_interval(&self, prediction: f64) -> (f64, f64) {
        let half = 1.96 * self.variance().sqrt();
        (prediction - half, prediction + half)
    }

    /// MAE, RMSE and R² of the linear part. Zero below ten observations.
    pub fn model_metrics(&self) -> ModelMetrics {
        let n = self.window.len();
        if n < METRICS_MIN_POINTS {
            return ModelMetrics::default();
        }
        let n_f = n as f64;
        let mean = self.mean_wait();
        let (mut abs_sum, mut sq_sum, mut total_var) = (0.0, 0.0, 0.0);
        for obs in &self.window {
            let err = (obs.actual_wait - self.model.linear(&features(&obs.input))).abs();
            abs_sum += err;
            sq_sum += err * err;
            total_var += (obs.actual_wait - mean).powi(2);
        }
        let mse = sq_sum / n_f;
        let r2 = if total_var > 0.0 {
            1.0 - mse / (total_var / n_f)
        } else {
            0.0
        };
        ModelMetrics {
            mae: abs_sum / n_f,
            rmse: mse.sqrt(),
            r2,
        }
    }

    /// Current model parameters.
    pub const fn model(&self) -> &LinearModel {
        &self.model
    }

    /// Observations currently in the window.
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Push fit metrics to the attached sink.
    pub fn publish_metrics(&self) {
        let Some(sink) = &self.metrics else {
            return;
        };
        let m = self.model_metrics();
        sink.record(MetricEvent::gauge("predictor.mae", m.mae));
        sink.record(MetricEvent::gauge("predictor.rmse", m.rmse));
        sink.record(MetricEvent::gauge("predictor.r2", m.r2));
        sink.record(MetricEvent::gauge(
            "predictor.window",
            self.window.len() as f64,
        ));
    }

    fn push(&mut self, observation: Observation) {
        if self.window.len() >= self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(observation);
    }

    /// Per-sample gradient descent on the linear part. Returns epochs run.
    fn train(&mut self, epochs: usize) -> usize {
        if self.window.is_empty() {
            return 0;
        }
        let n = self.window.len() as f64;
        for epoch in 0..epochs {
            let mut total = 0.0;
            for obs in &self.window {
                let x = features(&obs.input);
                let error = obs.actual_wait - self.model.linear(&x);
                total += error * error;
                self.model.step(&x, error, self.learning_rate);
            }
            if total / n < CONVERGED_MSE {
                return epoch + 1;
            }
        }
        epochs
    }

    fn mean_wait(&self) -> f64 {
        self.window.iter().map(|o| o.actual_wait).sum::<f64>() / self.window.len() as f64
    }

    fn variance(&self) -> f64 {
        if self.window.len() < 2 {
            return DEFAULT_VARIANCE;
        }
        let mean = self.mean_wait();
        self.window
            .iter()
            .map(|o| (o.actual_wait - mean).powi(2))
            .sum::<f64>()
            / self.window.len() as f64
    }
}

fn synthetic_observation(rng: &mut StdRng) -> Observation {
    let level: u8 = rng.random_range(1..=5);
    let urgency = Urgency::new(level).unwrap_or(Urgency::MIN);
    let queue_size: usize = rng.random_range(0..10);
    let hour_of_day: u8 = rng.random_range(0..24);
    let availability: f64 = rng.random();
    let mut wait = 20.0 - f64::from(level) * 3.5 + queue_size as f64 * 4.8;
    if is_peak_hour(hour_of_day) {
        wait += 10.0;
    }
    wait *= 1.0 - availability * 0.3;
    wait += (rng.random::<f64>() - 0.5) * 5.0;
    Observation {
        input: PredictionInput {
            urgency,
            queue_size,
            hour_of_day,
            availability,
        },
        actual_wait: wait.max(MIN_SYNTHETIC_WAIT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> PredictorConfig {
        PredictorConfig {
            seed: Some(seed),
            ..PredictorConfig::default()
        }
    }

    fn input(urgency: u8, queue_size: usize) -> PredictionInput {
        PredictionInput {
            urgency: Urgency::new(urgency).unwrap(),
            queue_size,
            hour_of_day: 3,
            availability: 0.5,
        }
    }

    #[test]
    fn test_seeded_training_is_reproducible() {
        let a = WaitTimePredictor::new(&config(7));
        let b = WaitTimePredictor::new(&config(7));
        assert_eq!(a.model(), b.model());
        assert_eq!(a.window_len(), 100);
    }

    #[test]
    fn test_prediction_floor() {
        let empty = PredictorConfig {
            synthetic_samples: 0,
            ..config(1)
        };
        let mut p = WaitTimePredictor::new(&empty);
        p.model = LinearModel {
            bias: -50.0,
            weights: [0.0; 4],
        };
        assert!((p.predict(&input(2, 0)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_variance_default_below_two_points() {
        let empty = PredictorConfig {
            synthetic_samples: 0,
            ..config(1)
        };
        let p = WaitTimePredictor::new(&empty);
        let (lo, hi) = p.confidence_interval(20.0);
        let half = 1.96 * 10.0_f64.sqrt();
        assert!((lo - (20.0 - half)).abs() < 1e-9);
        assert!((hi - (20.0 + half)).abs() < 1e-9);
        assert_eq!(p.model_metrics(), ModelMetrics::default());
    }

    #[test]
    fn test_window_is_bounded() {
        let small = PredictorConfig {
            window_size: 120,
            ..config(3)
        };
        let mut p = WaitTimePredictor::new(&small);
        for _ in 0..50 {
            p.update(Observation {
                input: input(3, 2),
                actual_wait: 12.0,
            });
        }
        assert_eq!(p.window_len(), 120);
    }
}
