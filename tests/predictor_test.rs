//! Integration tests for the wait-time predictor.

use std::sync::Arc;

use prometheus_ward::config::PredictorConfig;
use prometheus_ward::core::InMemoryMetricsSink;
use prometheus_ward::predictor::{Observation, PredictionInput, WaitTimePredictor};
use prometheus_ward::util::serde::Urgency;

fn predictor(seed: u64) -> WaitTimePredictor {
    WaitTimePredictor::new(&PredictorConfig {
        seed: Some(seed),
        ..PredictorConfig::default()
    })
}

fn input(urgency: u8, queue_size: usize, hour_of_day: u8) -> PredictionInput {
    PredictionInput {
        urgency: Urgency::new(urgency).unwrap(),
        queue_size,
        hour_of_day,
        availability: 0.5,
    }
}

#[test]
fn test_longer_queue_means_longer_wait() {
    let p = predictor(11);
    assert!(p.predict(&input(3, 8, 3)) > p.predict(&input(3, 0, 3)));
}

#[test]
fn test_critical_requests_are_expedited() {
    let p = predictor(11);
    let routine = p.predict(&input(1, 5, 3));
    let critical = p.predict(&input(5, 5, 3));
    assert!(critical < routine);
    assert!(critical >= 1.0);
}

#[test]
fn test_prediction_adapts_to_observed_waits() {
    let mut p = predictor(5);
    let state = input(3, 2, 3);
    let before = p.predict(&state);
    let target = before + 40.0;

    for _ in 0..300 {
        p.update(Observation {
            input: state,
            actual_wait: target,
        });
    }
    let after = p.predict(&state);
    assert!(after > before);
    assert!((target - after).abs() < (target - before).abs());
}

#[test]
fn test_interval_brackets_prediction() {
    let p = predictor(9);
    let wait = p.predict(&input(2, 4, 10));
    let (lower, upper) = p.confidence_interval(wait);
    assert!(lower < wait && wait < upper);
    assert!((wait - lower - (upper - wait)).abs() < 1e-9);
}

#[test]
fn test_metrics_after_training() {
    let sink = InMemoryMetricsSink::new(16);
    let p = predictor(13).with_metrics(Arc::new(sink.clone()));
    let m = p.model_metrics();
    assert!(m.mae > 0.0);
    assert!(m.rmse >= m.mae);
    assert!(m.r2 <= 1.0);

    p.publish_metrics();
    assert_eq!(sink.gauge("predictor.window"), Some(100.0));
    assert_eq!(sink.gauge("predictor.mae"), Some(m.mae));
}
