//! Metrics push API.
//!
//! Components publish named gauges and append samples to named series.
//! Presentation layers read them from whichever sink is installed.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::util::clock::now_ms;

/// One pushed metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    /// Latest value of a named gauge.
    Gauge {
        /// Gauge name.
        name: String,
        /// Value.
        value: f64,
        /// Push time.
        at_ms: u128,
    },
    /// Sample appended to a named series.
    Sample {
        /// Series name.
        series: String,
        /// Value.
        value: f64,
        /// Push time.
        at_ms: u128,
    },
}

impl MetricEvent {
    /// Gauge stamped with the current time.
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self::Gauge {
            name: name.into(),
            value,
            at_ms: now_ms(),
        }
    }

    /// Series sample stamped with the current time.
    pub fn sample(series: impl Into<String>, value: f64) -> Self {
        Self::Sample {
            series: series.into(),
            value,
            at_ms: now_ms(),
        }
    }
}

/// Metrics sink abstraction. One-way; sinks never fail the caller.
pub trait MetricsSink: Send + Sync {
    /// Record a metric event.
    fn record(&self, event: MetricEvent);
}

/// Shared sink handle.
pub type SharedMetricsSink = Arc<dyn MetricsSink>;

/// In-memory sink with a bounded buffer. Clones share the buffer.
#[derive(Clone)]
pub struct InMemoryMetricsSink {
    events: Arc<Mutex<VecDeque<MetricEvent>>>,
    max_events: usize,
}

impl InMemoryMetricsSink {
    /// Create a sink keeping at most `max_events` events.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1024)))),
            max_events,
        }
    }

    /// Snapshot of stored events, oldest first.
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Most recent value of a gauge.
    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.events.lock().iter().rev().find_map(|e| match e {
            MetricEvent::Gauge { name: n, value, .. } if n == name => Some(*value),
            _ => None,
        })
    }

    /// Samples of a series, oldest first.
    pub fn series(&self, name: &str) -> Vec<f64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                MetricEvent::Sample { series, value, .. } if series == name => Some(*value),
                _ => None,
            })
            .collect()
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn record(&self, event: MetricEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Sink that forwards every event to `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record(&self, event: MetricEvent) {
        match event {
            MetricEvent::Gauge { name, value, .. } => {
                tracing::debug!(target: "prometheus_ward::metrics", gauge = %name, value, "gauge");
            }
            MetricEvent::Sample { series, value, .. } => {
                tracing::debug!(target: "prometheus_ward::metrics", series = %series, value, "sample");
            }
        }
    }
}
