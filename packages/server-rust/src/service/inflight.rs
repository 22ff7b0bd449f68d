//! Per-strategy in-flight counters with RAII guards.
//!
//! Each invocation holds an `InFlightGuard` for its whole lifetime. The
//! counter is incremented when the guard is created and decremented when
//! it drops, including when the orchestration future is dropped mid-flight
//! (client disconnect) or unwinds from a panic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fanout_lab_core::Strategy;

use crate::traits::ObservationSink;

#[derive(Debug, Default)]
pub struct InFlightGauges {
    counters: [AtomicU64; Strategy::COUNT],
}

impl InFlightGauges {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current in-flight count for one strategy.
    #[must_use]
    pub fn get(&self, strategy: Strategy) -> u64 {
        self.counters[strategy.index()].load(Ordering::Acquire)
    }

    /// Sum across all strategies.
    #[must_use]
    pub fn total(&self) -> u64 {
        Strategy::ALL.into_iter().map(|s| self.get(s)).sum()
    }

    /// Marks one invocation of `strategy` as started and reports it to `sink`.
    #[must_use]
    pub fn enter(
        self: &Arc<Self>,
        strategy: Strategy,
        sink: Arc<dyn ObservationSink>,
    ) -> InFlightGuard {
        self.counters[strategy.index()].fetch_add(1, Ordering::AcqRel);
        sink.in_flight_adjusted(strategy, 1);
        InFlightGuard {
            gauges: Arc::clone(self),
            strategy,
            sink,
        }
    }
}

/// Decrements the strategy's counter when dropped.
pub struct InFlightGuard {
    gauges: Arc<InFlightGauges>,
    strategy: Strategy,
    sink: Arc<dyn ObservationSink>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let previous = self.gauges.counters[self.strategy.index()].fetch_sub(1, Ordering::AcqRel);
        debug_assert!(
            previous > 0,
            "in-flight counter for {} went negative",
            self.strategy
        );
        self.sink.in_flight_adjusted(self.strategy, -1);
    }
}

impl std::fmt::Debug for InFlightGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightGuard")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::observe::NoopSink;

    fn sink() -> Arc<dyn ObservationSink> {
        Arc::new(NoopSink)
    }

    #[test]
    fn guard_increments_and_decrements() {
        let gauges = Arc::new(InFlightGauges::new());
        assert_eq!(gauges.get(Strategy::Bounded), 0);

        let g1 = gauges.enter(Strategy::Bounded, sink());
        let g2 = gauges.enter(Strategy::Bounded, sink());
        let g3 = gauges.enter(Strategy::Sequential, sink());
        assert_eq!(gauges.get(Strategy::Bounded), 2);
        assert_eq!(gauges.get(Strategy::Sequential), 1);
        assert_eq!(gauges.total(), 3);

        drop(g1);
        assert_eq!(gauges.get(Strategy::Bounded), 1);
        drop(g2);
        drop(g3);
        assert_eq!(gauges.total(), 0);
    }

    #[tokio::test]
    async fn guard_released_when_future_is_dropped() {
        let gauges = Arc::new(InFlightGauges::new());
        let fut = {
            let gauges = Arc::clone(&gauges);
            async move {
                let _guard = gauges.enter(Strategy::Timeout, sink());
                std::future::pending::<()>().await;
            }
        };

        let handle = tokio::spawn(fut);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(gauges.get(Strategy::Timeout), 1);

        handle.abort();
        let _ = handle.await;
        assert_eq!(gauges.get(Strategy::Timeout), 0);
    }
}
