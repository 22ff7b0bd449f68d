//! Simulated downstream dependencies with a latency and error profile.
//!
//! - A: fast and stable, 50-150ms, never fails.
//! - B: slow and unstable, 300-1200ms, fails immediately with probability
//!   `error_rate` (default 5%).

use std::time::Duration;

use async_trait::async_trait;
use fanout_lab_core::{DependencyError, DependencyName, Payload};
use rand::Rng;

use crate::service::deadline::Deadline;
use crate::traits::Dependency;

/// How the simulated delay is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayModel {
    /// Uniform over `min_ms..=max_ms`.
    Uniform { min_ms: u64, max_ms: u64 },
    /// Always exactly this many milliseconds.
    Fixed(u64),
}

impl DelayModel {
    /// Uniform model; bounds are swapped if given in the wrong order.
    #[must_use]
    pub fn uniform(min_ms: u64, max_ms: u64) -> Self {
        Self::Uniform {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    fn sample_ms(self) -> u64 {
        match self {
            Self::Fixed(ms) => ms,
            Self::Uniform { min_ms, max_ms } if min_ms >= max_ms => min_ms,
            Self::Uniform { min_ms, max_ms } => rand::rng().random_range(min_ms..=max_ms),
        }
    }
}

/// Latency and failure profile of one simulated dependency.
#[derive(Debug, Clone)]
pub struct DependencyProfile {
    pub name: DependencyName,
    /// Marker returned in the success payload.
    pub marker: &'static str,
    pub delay: DelayModel,
    /// Probability of an immediate failure, clamped to `[0, 1]`.
    pub error_rate: f64,
}

impl DependencyProfile {
    /// Fast, stable dependency A.
    #[must_use]
    pub fn service_a() -> Self {
        Self {
            name: DependencyName::A,
            marker: "data-from-A",
            delay: DelayModel::uniform(50, 150),
            error_rate: 0.0,
        }
    }

    /// Slow dependency B with intermittent failures.
    #[must_use]
    pub fn service_b(error_rate: f64) -> Self {
        Self {
            name: DependencyName::B,
            marker: "data-from-B",
            delay: DelayModel::uniform(300, 1200),
            error_rate,
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: DelayModel) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_error_rate(mut self, error_rate: f64) -> Self {
        self.error_rate = error_rate;
        self
    }
}

/// `Dependency` implementation that sleeps for a sampled delay.
#[derive(Debug, Clone)]
pub struct SimulatedDependency {
    profile: DependencyProfile,
}

impl SimulatedDependency {
    #[must_use]
    pub fn new(profile: DependencyProfile) -> Self {
        let error_rate = if profile.error_rate.is_nan() {
            0.0
        } else {
            profile.error_rate.clamp(0.0, 1.0)
        };
        Self {
            profile: DependencyProfile {
                error_rate,
                ..profile
            },
        }
    }

    #[must_use]
    pub fn profile(&self) -> &DependencyProfile {
        &self.profile
    }

    fn simulated_failure(&self) -> bool {
        self.profile.error_rate > 0.0 && rand::rng().random_bool(self.profile.error_rate)
    }
}

#[async_trait]
impl Dependency for SimulatedDependency {
    fn name(&self) -> DependencyName {
        self.profile.name
    }

    async fn invoke(&self, deadline: &Deadline) -> Result<Payload, DependencyError> {
        if self.simulated_failure() {
            return Err(DependencyError::failed(format!(
                "service {} simulated failure",
                self.profile.name
            )));
        }

        let sleep_ms = self.profile.delay.sample_ms();
        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(sleep_ms)) => Ok(Payload {
                value: self.profile.marker.to_string(),
                sleep_ms,
            }),
            reason = deadline.expired() => Err(DependencyError::Cancelled(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use fanout_lab_core::CancelReason;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn open_deadline() -> Deadline {
        Deadline::from_signal(CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn service_a_answers_within_its_range() {
        let dep = SimulatedDependency::new(DependencyProfile::service_a());
        let start = Instant::now();
        let payload = dep.invoke(&open_deadline()).await.unwrap();

        assert_eq!(payload.value, "data-from-A");
        assert!((50..=150).contains(&payload.sleep_ms));
        assert!(start.elapsed() >= Duration::from_millis(payload.sleep_ms));
    }

    #[tokio::test(start_paused = true)]
    async fn service_b_delay_stays_in_range() {
        let dep = SimulatedDependency::new(DependencyProfile::service_b(0.0));
        for _ in 0..20 {
            let payload = dep.invoke(&open_deadline()).await.unwrap();
            assert!((300..=1200).contains(&payload.sleep_ms));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn certain_failure_returns_immediately() {
        let dep = SimulatedDependency::new(DependencyProfile::service_b(1.0));
        let start = Instant::now();
        let err = dep.invoke(&open_deadline()).await.unwrap_err();

        assert_eq!(err, DependencyError::failed("service B simulated failure"));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn error_rate_override_applies_to_service_a() {
        let dep = SimulatedDependency::new(DependencyProfile::service_a().with_error_rate(1.0));
        let err = dep.invoke(&open_deadline()).await.unwrap_err();
        assert_eq!(err, DependencyError::failed("service A simulated failure"));

        let dep = SimulatedDependency::new(DependencyProfile::service_b(1.0).with_error_rate(0.0));
        assert!(dep.invoke(&open_deadline()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_the_delay_short() {
        let dep = SimulatedDependency::new(
            DependencyProfile::service_b(0.0).with_delay(DelayModel::Fixed(1000)),
        );
        let deadline = Deadline::after(CancellationToken::new(), Duration::from_millis(600));
        let start = Instant::now();
        let err = dep.invoke(&deadline).await.unwrap_err();

        assert_eq!(err, DependencyError::Cancelled(CancelReason::DeadlineExceeded));
        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[test]
    fn error_rate_is_clamped() {
        let dep = SimulatedDependency::new(DependencyProfile::service_b(7.0));
        assert!((dep.profile().error_rate - 1.0).abs() < f64::EPSILON);
        let dep = SimulatedDependency::new(DependencyProfile::service_b(f64::NAN));
        assert!(dep.profile().error_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn uniform_orders_its_bounds() {
        assert_eq!(
            DelayModel::uniform(900, 300),
            DelayModel::Uniform {
                min_ms: 300,
                max_ms: 900
            }
        );
        assert_eq!(DelayModel::Fixed(42).sample_ms(), 42);
    }
}
