//! Per-instance load bookkeeping.

use serde::{Deserialize, Serialize};

use crate::core::ResourceKind;
use crate::util::serde::ResourceId;

/// Weight of the previous average in the exponential moving average.
pub const EMA_DECAY: f64 = 0.9;

/// Load tracked for one resource instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRecord {
    /// Instance id.
    pub resource_id: ResourceId,
    /// Instance kind.
    pub kind: ResourceKind,
    /// Requests currently assigned.
    pub current_load: u32,
    /// Exponentially weighted average of `current_load`.
    pub average_load: f64,
    /// Highest `current_load` seen.
    pub peak_load: u32,
    /// Assignments recorded over the instance's lifetime.
    pub allocations: u64,
    /// Time of the last change.
    pub last_update_ms: u128,
}

impl LoadRecord {
    /// Zero record for a newly discovered instance.
    pub fn new(resource_id: impl Into<ResourceId>, kind: ResourceKind, now_ms: u128) -> Self {
        Self {
            resource_id: resource_id.into(),
            kind,
            current_load: 0,
            average_load: 0.0,
            peak_load: 0,
            allocations: 0,
            last_update_ms: now_ms,
        }
    }

    /// Whether the instance should be skipped by selection.
    pub const fn is_overloaded(&self, threshold: u32) -> bool {
        self.current_load > threshold
    }

    /// One more request assigned.
    pub fn increment(&mut self, now_ms: u128) {
        self.current_load += 1;
        self.peak_load = self.peak_load.max(self.current_load);
        self.last_update_ms = now_ms;
    }

    /// One request fewer, floored at zero.
    pub fn decrement(&mut self, now_ms: u128) {
        self.current_load = self.current_load.saturating_sub(1);
        self.last_update_ms = now_ms;
    }

    /// Fold the current load into the moving average.
    pub fn update_average(&mut self) {
        self.average_load = self
            .average_load
            .mul_add(EMA_DECAY, f64::from(self.current_load) * (1.0 - EMA_DECAY));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_tracks_peak_and_decrement_floors() {
        let mut r = LoadRecord::new("D1", ResourceKind::Doctor, 0);
        r.increment(1);
        r.increment(2);
        r.decrement(3);
        r.decrement(4);
        r.decrement(5);
        assert_eq!(r.current_load, 0);
        assert_eq!(r.peak_load, 2);
        assert_eq!(r.last_update_ms, 5);
    }

    #[test]
    fn test_average_update() {
        let mut r = LoadRecord::new("D1", ResourceKind::Doctor, 0);
        r.current_load = 10;
        r.update_average();
        assert!((r.average_load - 1.0).abs() < 1e-12);
        r.update_average();
        assert!((r.average_load - 1.9).abs() < 1e-12);
    }

    #[test]
    fn test_overload_threshold_is_strict() {
        let mut r = LoadRecord::new("D1", ResourceKind::Doctor, 0);
        r.current_load = 5;
        assert!(!r.is_overloaded(5));
        r.current_load = 6;
        assert!(r.is_overloaded(5));
    }
}
