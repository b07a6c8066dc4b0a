//! Tests for metrics sinks

use std::sync::Arc;

use prometheus_ward::core::{InMemoryMetricsSink, MetricEvent, MetricsSink, SharedMetricsSink};

#[test]
fn test_sink_is_bounded() {
    let sink = InMemoryMetricsSink::new(3);
    for i in 0..5 {
        sink.record(MetricEvent::sample("s", f64::from(i)));
    }
    assert_eq!(sink.events().len(), 3);
    assert_eq!(sink.series("s"), vec![2.0, 3.0, 4.0]);
}

#[test]
fn test_gauge_returns_latest_value() {
    let sink = InMemoryMetricsSink::new(16);
    sink.record(MetricEvent::gauge("queue", 1.0));
    sink.record(MetricEvent::gauge("other", 9.0));
    sink.record(MetricEvent::gauge("queue", 4.0));
    assert_eq!(sink.gauge("queue"), Some(4.0));
    assert_eq!(sink.gauge("missing"), None);
}

#[test]
fn test_clones_share_buffer() {
    let sink = InMemoryMetricsSink::new(16);
    let shared: SharedMetricsSink = Arc::new(sink.clone());
    shared.record(MetricEvent::gauge("g", 2.0));
    assert_eq!(sink.gauge("g"), Some(2.0));
}
