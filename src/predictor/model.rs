//! Feature extraction and linear model for wait-time prediction.

use serde::{Deserialize, Serialize};

use crate::util::serde::Urgency;

/// System state a prediction is made for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    /// Request urgency.
    pub urgency: Urgency,
    /// Requests queued at the time.
    pub queue_size: usize,
    /// UTC hour of day, 0-23.
    pub hour_of_day: u8,
    /// Share of resources available, 0.0 to 1.0.
    pub availability: f64,
}

/// An observed wait, in the same unit the predictor returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// State at dispatch.
    pub input: PredictionInput,
    /// Wait actually observed.
    pub actual_wait: f64,
}

/// Peak windows 09-11 and 14-16, inclusive.
pub const fn is_peak_hour(hour: u8) -> bool {
    matches!(hour, 9..=11 | 14..=16)
}

/// Normalised features: urgency, queue size, peak flag, availability.
pub fn features(input: &PredictionInput) -> [f64; 4] {
    [
        (f64::from(input.urgency.level()) - 3.0) / 2.0,
        input.queue_size as f64 / 10.0,
        if is_peak_hour(input.hour_of_day) { 1.0 } else { 0.0 },
        input.availability.clamp(0.0, 1.0),
    ]
}

/// Urgency-dependent scaling applied on top of the linear part.
pub fn urgency_scale(urgency: Urgency) -> f64 {
    if urgency == Urgency::MAX {
        return 0.3;
    }
    let centred = f64::from(urgency.level()) - 3.0;
    0.5 + 1.0 / (1.0 + (-centred * 0.5).exp())
}

/// Bias plus one weight per feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    /// Intercept.
    pub bias: f64,
    /// Weights for urgency, queue size, peak flag and availability.
    pub weights: [f64; 4],
}

impl Default for LinearModel {
    fn default() -> Self {
        Self {
            bias: 15.0,
            weights: [-3.0, 5.0, 0.5, -10.0],
        }
    }
}

impl LinearModel {
    /// Linear prediction without scaling or floor.
    pub fn linear(&self, x: &[f64; 4]) -> f64 {
        self.bias + self.weights.iter().zip(x).map(|(w, f)| w * f).sum::<f64>()
    }

    /// One gradient step toward `error = actual - predicted`.
    pub fn step(&mut self, x: &[f64; 4], error: f64, learning_rate: f64) {
        self.bias += learning_rate * error;
        for (w, f) in self.weights.iter_mut().zip(x) {
            *w += learning_rate * error * f;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(urgency: u8, queue_size: usize, hour: u8, availability: f64) -> PredictionInput {
        PredictionInput {
            urgency: Urgency::new(urgency).unwrap(),
            queue_size,
            hour_of_day: hour,
            availability,
        }
    }

    #[test]
    fn test_peak_windows() {
        for hour in [9, 10, 11, 14, 15, 16] {
            assert!(is_peak_hour(hour), "{hour} should be peak");
        }
        for hour in [0, 8, 12, 13, 17, 23] {
            assert!(!is_peak_hour(hour), "{hour} should be off-peak");
        }
    }

    #[test]
    fn test_features() {
        let x = features(&input(5, 4, 10, 0.25));
        assert_eq!(x, [1.0, 0.4, 1.0, 0.25]);
    }

    #[test]
    fn test_urgency_scale() {
        assert!((urgency_scale(Urgency::MAX) - 0.3).abs() < 1e-12);
        assert!((urgency_scale(Urgency::new(3).unwrap()) - 1.0).abs() < 1e-12);
        assert!(urgency_scale(Urgency::new(4).unwrap()) > 1.0);
        assert!(urgency_scale(Urgency::MIN) < 1.0);
    }

    #[test]
    fn test_initial_linear_prediction() {
        let model = LinearModel::default();
        let x = features(&input(3, 0, 0, 0.0));
        assert!((model.linear(&x) - 15.0).abs() < 1e-12);
    }
}
