//! Terminal outcome of one orchestration invocation.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::result::DependencyResult;
use crate::types::{CancelReason, DependencyName, Payload, Strategy};

/// The three caller-visible terminal kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    DependencyFailure,
    Cancelled(CancelReason),
}

impl OutcomeKind {
    /// Classifies a single sub-result (the Sequential short-circuit on A).
    #[must_use]
    pub fn of_single(result: &DependencyResult) -> Self {
        match result {
            DependencyResult::Success { .. } => Self::Success,
            DependencyResult::Failure { cause, .. } => match cause.cancel_reason() {
                Some(reason) => Self::Cancelled(reason),
                None => Self::DependencyFailure,
            },
        }
    }

    /// Classifies two arrived sub-results.
    ///
    /// A cancellation on either side wins over a dependency failure, and A's
    /// cancellation reason is preferred when both were cancelled.
    #[must_use]
    pub fn of_pair(a: &DependencyResult, b: &DependencyResult) -> Self {
        if let Some(reason) = a.cancel_reason().or_else(|| b.cancel_reason()) {
            return Self::Cancelled(reason);
        }
        if a.is_success() && b.is_success() {
            Self::Success
        } else {
            Self::DependencyFailure
        }
    }

    /// Metric label for this kind.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::DependencyFailure => "dependency_failure",
            Self::Cancelled(_) => "cancelled",
        }
    }

    #[must_use]
    pub fn is_cancelled(self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pairs the results for A and B with the strategy and total latency.
///
/// `a` or `b` is `None` when that sub-result never reached the fan-in step:
/// either the invocation was cancelled first, or (Sequential only) B was
/// never invoked because A failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedOutcome {
    pub strategy: Strategy,
    pub a: Option<DependencyResult>,
    pub b: Option<DependencyResult>,
    /// Time B spent waiting for a gate token (bounded strategy only).
    pub gate_wait: Option<Duration>,
    pub total: Duration,
    pub kind: OutcomeKind,
}

impl ComposedOutcome {
    /// Outcome for an invocation whose sub-results all arrived.
    #[must_use]
    pub fn completed(
        strategy: Strategy,
        a: DependencyResult,
        b: DependencyResult,
        gate_wait: Option<Duration>,
        total: Duration,
    ) -> Self {
        let kind = OutcomeKind::of_pair(&a, &b);
        Self {
            strategy,
            a: Some(a),
            b: Some(b),
            gate_wait,
            total,
            kind,
        }
    }

    /// Outcome for a Sequential invocation that stopped after A.
    #[must_use]
    pub fn short_circuited(strategy: Strategy, a: DependencyResult, total: Duration) -> Self {
        let kind = OutcomeKind::of_single(&a);
        Self {
            strategy,
            a: Some(a),
            b: None,
            gate_wait: None,
            total,
            kind,
        }
    }

    /// Outcome for an invocation abandoned because its deadline fired.
    #[must_use]
    pub fn cancelled(
        strategy: Strategy,
        reason: CancelReason,
        a: Option<DependencyResult>,
        b: Option<DependencyResult>,
        gate_wait: Option<Duration>,
        total: Duration,
    ) -> Self {
        Self {
            strategy,
            a,
            b,
            gate_wait,
            total,
            kind: OutcomeKind::Cancelled(reason),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }

    /// Returns the payload for the given dependency, if it succeeded.
    #[must_use]
    pub fn payload(&self, name: DependencyName) -> Option<&Payload> {
        let result = match name {
            DependencyName::A => self.a.as_ref(),
            DependencyName::B => self.b.as_ref(),
        };
        result.and_then(DependencyResult::payload)
    }

    /// Total latency in whole milliseconds.
    #[must_use]
    pub fn total_ms(&self) -> u64 {
        duration_ms(self.total)
    }

    /// Gate wait in whole milliseconds, when B went through the gate.
    #[must_use]
    pub fn gate_wait_ms(&self) -> Option<u64> {
        self.gate_wait.map(duration_ms)
    }

    /// Per-dependency status line, e.g. `A:ok B:service B simulated failure`.
    #[must_use]
    pub fn summary(&self) -> String {
        let missing = if self.strategy.is_concurrent() {
            "pending"
        } else {
            "not invoked"
        };
        let describe = |result: Option<&DependencyResult>| {
            result.map_or_else(|| missing.to_string(), ToString::to_string)
        };
        format!(
            "A:{} B:{}",
            describe(self.a.as_ref()),
            describe(self.b.as_ref())
        )
    }

    /// Caller-facing error text for non-success outcomes.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self.kind {
            OutcomeKind::Success => None,
            OutcomeKind::DependencyFailure => Some(self.summary()),
            OutcomeKind::Cancelled(reason) => Some(format!("{reason} ({})", self.summary())),
        }
    }
}

/// Converts a duration to whole milliseconds, saturating at `u64::MAX`.
#[must_use]
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::{prop_assert, prop_assert_eq, prop_oneof, proptest, Just};
    use proptest::strategy::Strategy as PropStrategy;

    use super::*;
    use crate::result::DependencyError;

    fn ok(name: &str, ms: u64) -> DependencyResult {
        DependencyResult::Success {
            payload: Payload {
                value: format!("data-from-{name}"),
                sleep_ms: ms,
            },
            elapsed: Duration::from_millis(ms),
        }
    }

    fn failed() -> DependencyResult {
        DependencyResult::Failure {
            cause: DependencyError::failed("service B simulated failure"),
            elapsed: Duration::ZERO,
        }
    }

    fn cancelled(reason: CancelReason) -> DependencyResult {
        DependencyResult::Failure {
            cause: DependencyError::Cancelled(reason),
            elapsed: Duration::from_millis(600),
        }
    }

    #[test]
    fn both_successes_compose_to_success() {
        let outcome = ComposedOutcome::completed(
            Strategy::Unbounded,
            ok("A", 80),
            ok("B", 500),
            None,
            Duration::from_millis(502),
        );
        assert!(outcome.is_success());
        assert_eq!(outcome.payload(DependencyName::B).unwrap().sleep_ms, 500);
        assert_eq!(outcome.error_message(), None);
        assert_eq!(outcome.total_ms(), 502);
    }

    #[test]
    fn b_failure_is_dependency_failure_with_both_statuses() {
        let outcome = ComposedOutcome::completed(
            Strategy::Bounded,
            ok("A", 80),
            failed(),
            Some(Duration::from_millis(12)),
            Duration::from_millis(80),
        );
        assert_eq!(outcome.kind, OutcomeKind::DependencyFailure);
        assert_eq!(
            outcome.error_message().unwrap(),
            "A:ok B:service B simulated failure"
        );
        assert_eq!(outcome.gate_wait_ms(), Some(12));
    }

    #[test]
    fn sequential_short_circuit_reports_b_not_invoked() {
        let outcome = ComposedOutcome::short_circuited(
            Strategy::Sequential,
            failed(),
            Duration::from_millis(1),
        );
        assert_eq!(outcome.kind, OutcomeKind::DependencyFailure);
        assert!(outcome.b.is_none());
        assert_eq!(
            outcome.summary(),
            "A:service B simulated failure B:not invoked"
        );
    }

    #[test]
    fn cancelled_single_result_is_cancelled_not_failure() {
        let kind = OutcomeKind::of_single(&cancelled(CancelReason::Caller));
        assert_eq!(kind, OutcomeKind::Cancelled(CancelReason::Caller));
    }

    #[test]
    fn abandoned_outcome_reports_pending_sub_results() {
        let outcome = ComposedOutcome::cancelled(
            Strategy::Timeout,
            CancelReason::DeadlineExceeded,
            Some(ok("A", 90)),
            None,
            None,
            Duration::from_millis(600),
        );
        assert!(outcome.kind.is_cancelled());
        assert_eq!(
            outcome.error_message().unwrap(),
            "deadline exceeded (A:ok B:pending)"
        );
    }

    #[test]
    fn outcome_kind_labels() {
        assert_eq!(OutcomeKind::Success.label(), "success");
        assert_eq!(OutcomeKind::DependencyFailure.label(), "dependency_failure");
        assert_eq!(
            OutcomeKind::Cancelled(CancelReason::DeadlineExceeded).label(),
            "cancelled"
        );
    }

    fn arb_result() -> impl PropStrategy<Value = DependencyResult> {
        prop_oneof![
            (0u64..2000).prop_map(|ms| ok("X", ms)),
            Just(failed()),
            Just(cancelled(CancelReason::Caller)),
            Just(cancelled(CancelReason::DeadlineExceeded)),
        ]
    }

    proptest! {
        #[test]
        fn pair_classification_rules(a in arb_result(), b in arb_result()) {
            let kind = OutcomeKind::of_pair(&a, &b);
            let any_cancelled = a.cancel_reason().is_some() || b.cancel_reason().is_some();
            if any_cancelled {
                prop_assert!(kind.is_cancelled());
            } else if a.is_success() && b.is_success() {
                prop_assert_eq!(kind, OutcomeKind::Success);
            } else {
                prop_assert_eq!(kind, OutcomeKind::DependencyFailure);
            }
            // Classification never depends on argument order except for the
            // preferred cancellation reason.
            prop_assert_eq!(kind.label(), OutcomeKind::of_pair(&b, &a).label());
        }
    }
}
