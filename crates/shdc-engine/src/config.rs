//! Programmatic engine configuration. Loading these from a file or a CLI
//! is outside this crate's scope — callers build the structs directly.

use shdc_core::constants::{
    BROADCAST_ROTATION_PERIOD, DISCOVERY_BACKOFF_CAP, DISCOVERY_BACKOFF_SECS, DISCOVERY_TIMEOUT,
    MAX_CONSECUTIVE_FAILURES, ROTATION_ACTIVATION_DELAY, SESSION_ROTATION_PERIOD,
};
use std::time::Duration;

/// Sensor-side discovery retry schedule.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Backoff delays tried in order before falling back to `backoff_cap`.
    pub backoff_schedule: Vec<Duration>,
    /// Delay used once `backoff_schedule` is exhausted.
    pub backoff_cap: Duration,
    /// Total time spent discovering before giving up and returning to idle.
    pub timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            backoff_schedule: DISCOVERY_BACKOFF_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
            backoff_cap: DISCOVERY_BACKOFF_CAP,
            timeout: DISCOVERY_TIMEOUT,
        }
    }
}

impl DiscoveryConfig {
    /// The delay to use before the `attempt`-th retry (0-indexed).
    pub fn backoff_for_attempt(&self, attempt: usize) -> Duration {
        self.backoff_schedule
            .get(attempt)
            .copied()
            .unwrap_or(self.backoff_cap)
    }
}

/// Key rotation periods for both key classes.
#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Hub-wide broadcast key rotation period.
    pub broadcast_period: Duration,
    /// Per-sensor session key rotation period.
    pub session_period: Duration,
    /// Lead time between announcing a `KEY_ROTATION` and the new key's
    /// `valid_from`, during which the previous key remains the only one in
    /// use.
    pub activation_delay: Duration,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            broadcast_period: BROADCAST_ROTATION_PERIOD,
            session_period: SESSION_ROTATION_PERIOD,
            activation_delay: ROTATION_ACTIVATION_DELAY,
        }
    }
}

/// Top-level engine configuration shared by both roles.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Discovery retry behavior (sensor-only).
    pub discovery: DiscoveryConfig,
    /// Key rotation schedule (hub drives it; sensor just receives it).
    pub rotation: RotationConfig,
    /// Consecutive authentication failures from one peer before a sensor
    /// drops back to discovering a new hub. Not pinned by a literal value
    /// in the protocol design; see DESIGN.md for the rationale.
    pub max_consecutive_failures: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            rotation: RotationConfig::default(),
            max_consecutive_failures: MAX_CONSECUTIVE_FAILURES,
        }
    }
}
