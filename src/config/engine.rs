//! Engine configuration structures.
//!
//! Every timing value is stored in milliseconds so the JSON form stays flat;
//! `Duration` accessors are provided for the services.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Allocation coordinator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Maximum pending requests before `submit` is refused.
    pub max_queue_depth: usize,
    /// Period of the dispatch tick.
    pub dispatch_interval_ms: u64,
    /// Period of directory rediscovery.
    pub discovery_interval_ms: u64,
    /// Reply timeout for availability checks and allocations.
    pub reply_timeout_ms: u64,
    /// Release already-bound resources when a later step fails.
    pub compensate_on_failure: bool,
    /// Length of one wait-time unit fed to the predictor (default one minute).
    pub wait_time_unit_ms: u64,
    /// Period of metrics publication.
    pub metrics_interval_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: 1_000,
            dispatch_interval_ms: 5_000,
            discovery_interval_ms: 10_000,
            reply_timeout_ms: 2_000,
            compensate_on_failure: true,
            wait_time_unit_ms: 60_000,
            metrics_interval_ms: 60_000,
        }
    }
}

impl CoordinatorConfig {
    /// Dispatch tick period.
    pub const fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    /// Rediscovery period.
    pub const fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    /// Per-step reply timeout.
    pub const fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// Metrics period.
    pub const fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    /// Validate coordinator values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_queue_depth == 0 {
            return Err("max_queue_depth must be greater than 0".into());
        }
        if self.reply_timeout_ms == 0 {
            return Err("reply_timeout_ms must be greater than 0".into());
        }
        if self.wait_time_unit_ms == 0 {
            return Err("wait_time_unit_ms must be greater than 0".into());
        }
        check_intervals(&[
            ("dispatch_interval_ms", self.dispatch_interval_ms),
            ("discovery_interval_ms", self.discovery_interval_ms),
            ("metrics_interval_ms", self.metrics_interval_ms),
        ])
    }
}

/// Load balancer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Strategy name; unknown names fall back to round robin.
    pub strategy: String,
    /// Current load above which an instance is skipped by `select`.
    pub overload_threshold: u32,
    /// Period of directory rediscovery.
    pub discovery_interval_ms: u64,
    /// Period of the EMA decay tick.
    pub monitor_interval_ms: u64,
    /// Period of rebalancing.
    pub rebalance_interval_ms: u64,
    /// Period of metrics publication.
    pub metrics_interval_ms: u64,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            strategy: "round_robin".into(),
            overload_threshold: 5,
            discovery_interval_ms: 10_000,
            monitor_interval_ms: 5_000,
            rebalance_interval_ms: 30_000,
            metrics_interval_ms: 60_000,
        }
    }
}

impl BalancerConfig {
    /// Rediscovery period.
    pub const fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    /// EMA decay period.
    pub const fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Rebalance period.
    pub const fn rebalance_interval(&self) -> Duration {
        Duration::from_millis(self.rebalance_interval_ms)
    }

    /// Metrics period.
    pub const fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    /// Validate balancer values.
    pub fn validate(&self) -> Result<(), String> {
        check_intervals(&[
            ("discovery_interval_ms", self.discovery_interval_ms),
            ("monitor_interval_ms", self.monitor_interval_ms),
            ("rebalance_interval_ms", self.rebalance_interval_ms),
            ("metrics_interval_ms", self.metrics_interval_ms),
        ])
    }
}

/// Fault tolerance settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Expected heartbeat period; also the detection tick period.
    pub heartbeat_interval_ms: u64,
    /// Silence after which an actor is SUSPECTED. Defaults to twice the heartbeat interval.
    pub suspicion_window_ms: Option<u64>,
    /// Silence after which an actor is FAILED.
    pub failure_threshold_ms: u64,
    /// Period of state flushes to the store.
    pub flush_interval_ms: u64,
    /// Consecutive failed recoveries tolerated before escalation.
    pub max_recovery_attempts: u32,
    /// Base delay before retrying a failed recovery; doubles per failure.
    pub recovery_backoff_ms: u64,
    /// Upper bound on one respawn attempt; an elapsed attempt counts as failed.
    pub recovery_timeout_ms: u64,
    /// Directory for the JSON state file; in-memory store when absent.
    pub state_dir: Option<String>,
    /// File name of the JSON state file.
    pub state_file: String,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 5_000,
            suspicion_window_ms: None,
            failure_threshold_ms: 15_000,
            flush_interval_ms: 30_000,
            max_recovery_attempts: 3,
            recovery_backoff_ms: 1_000,
            recovery_timeout_ms: 5_000,
            state_dir: None,
            state_file: crate::infra::store::file::DEFAULT_STATE_FILE.into(),
        }
    }
}

impl FaultConfig {
    /// Heartbeat period.
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Effective suspicion window in milliseconds.
    pub fn suspicion_window_ms(&self) -> u64 {
        self.suspicion_window_ms
            .unwrap_or_else(|| self.heartbeat_interval_ms.saturating_mul(2))
    }

    /// Flush period.
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Time limit for one respawn attempt.
    pub const fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    /// Validate fault tolerance values.
    pub fn validate(&self) -> Result<(), String> {
        check_intervals(&[
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("failure_threshold_ms", self.failure_threshold_ms),
            ("flush_interval_ms", self.flush_interval_ms),
            ("recovery_timeout_ms", self.recovery_timeout_ms),
        ])?;
        if self.suspicion_window_ms() >= self.failure_threshold_ms {
            return Err("suspicion window must be shorter than failure_threshold_ms".into());
        }
        if self.state_file.trim().is_empty() {
            return Err("state_file must not be empty".into());
        }
        Ok(())
    }
}

/// Wait-time predictor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Gradient step size.
    pub learning_rate: f64,
    /// Observations kept in the sliding window.
    pub window_size: usize,
    /// Synthetic observations generated at start-up.
    pub synthetic_samples: usize,
    /// Maximum training epochs over the synthetic set.
    pub training_epochs: usize,
    /// RNG seed for the synthetic set; random when absent.
    pub seed: Option<u64>,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            window_size: 500,
            synthetic_samples: 100,
            training_epochs: 50,
            seed: None,
        }
    }
}

impl PredictorConfig {
    /// Validate predictor values.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err("learning_rate must be a positive number".into());
        }
        if self.window_size == 0 {
            return Err("window_size must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Coordinator settings.
    pub coordinator: CoordinatorConfig,
    /// Balancer settings.
    pub balancer: BalancerConfig,
    /// Fault tolerance settings.
    pub fault: FaultConfig,
    /// Predictor settings.
    pub predictor: PredictorConfig,
}

impl EngineConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.coordinator
            .validate()
            .map_err(|e| format!("coordinator invalid: {e}"))?;
        self.balancer
            .validate()
            .map_err(|e| format!("balancer invalid: {e}"))?;
        self.fault
            .validate()
            .map_err(|e| format!("fault invalid: {e}"))?;
        self.predictor
            .validate()
            .map_err(|e| format!("predictor invalid: {e}"))
    }

    /// Parse engine configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `WARD_*` environment variables. A `.env` file in
    /// the working directory is loaded first when present.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();
        let mut cfg = Self::default();
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `WARD_*` overrides from an arbitrary lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let c = &mut self.coordinator;
        override_parse(&lookup, "WARD_MAX_QUEUE_DEPTH", &mut c.max_queue_depth)?;
        override_parse(&lookup, "WARD_DISPATCH_INTERVAL_MS", &mut c.dispatch_interval_ms)?;
        override_parse(&lookup, "WARD_REPLY_TIMEOUT_MS", &mut c.reply_timeout_ms)?;
        override_parse(&lookup, "WARD_COMPENSATE_ON_FAILURE", &mut c.compensate_on_failure)?;

        let b = &mut self.balancer;
        if let Some(strategy) = lookup("WARD_BALANCER_STRATEGY") {
            b.strategy = strategy;
        }
        override_parse(&lookup, "WARD_OVERLOAD_THRESHOLD", &mut b.overload_threshold)?;

        let f = &mut self.fault;
        override_parse(&lookup, "WARD_HEARTBEAT_INTERVAL_MS", &mut f.heartbeat_interval_ms)?;
        override_parse(&lookup, "WARD_FAILURE_THRESHOLD_MS", &mut f.failure_threshold_ms)?;
        override_parse(&lookup, "WARD_FLUSH_INTERVAL_MS", &mut f.flush_interval_ms)?;
        override_parse(&lookup, "WARD_RECOVERY_TIMEOUT_MS", &mut f.recovery_timeout_ms)?;
        if let Some(dir) = lookup("WARD_STATE_DIR") {
            f.state_dir = Some(dir);
        }

        if let Some(seed) = lookup("WARD_PREDICTOR_SEED") {
            let seed = seed
                .parse()
                .map_err(|e| format!("WARD_PREDICTOR_SEED: {e}"))?;
            self.predictor.seed = Some(seed);
        }
        Ok(())
    }
}

fn override_parse<T, F>(lookup: &F, key: &str, target: &mut T) -> Result<(), String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = raw.trim().parse().map_err(|e| format!("{key}: {e}"))?;
    }
    Ok(())
}

fn check_intervals(values: &[(&str, u64)]) -> Result<(), String> {
    for (name, value) in values {
        if *value == 0 {
            return Err(format!("{name} must be greater than 0"));
        }
    }
    Ok(())
}
