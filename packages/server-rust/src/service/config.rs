use std::num::NonZeroU32;
use std::time::Duration;

/// Orchestrator and gate configuration, fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum number of concurrent B calls admitted by the bounded gate.
    pub gate_capacity: u32,
    /// Deadline applied by the timeout strategy, in milliseconds.
    pub timeout_ms: u64,
    /// Probability that a B call fails immediately.
    pub b_error_rate: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            gate_capacity: 20,
            timeout_ms: 600,
            b_error_rate: 0.05,
        }
    }
}

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("gate capacity must be at least 1")]
    ZeroGateCapacity,
    #[error("timeout must be at least 1ms")]
    ZeroTimeout,
    #[error("B error rate must be within [0, 1], got {0}")]
    ErrorRateOutOfRange(f64),
}

impl OrchestratorConfig {
    /// Checks every field and returns the validated gate capacity.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<NonZeroU32, ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if !(0.0..=1.0).contains(&self.b_error_rate) {
            return Err(ConfigError::ErrorRateOutOfRange(self.b_error_rate));
        }
        NonZeroU32::new(self.gate_capacity).ok_or(ConfigError::ZeroGateCapacity)
    }

    /// Deadline applied by the timeout strategy.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
