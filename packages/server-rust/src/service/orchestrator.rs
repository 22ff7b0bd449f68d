//! Composes the two dependency calls according to one of four strategies.
//!
//! Per invocation: `Start -> {A-pending, B-pending} -> Both-done | Cancelled`.
//!
//! - **Sequential**: A to completion, then B. A failure short-circuits.
//! - **Unbounded**: A and B as sub-tasks, fanned in under the caller's deadline.
//! - **Bounded**: as Unbounded, but B first takes a token from the gate.
//! - **Timeout**: as Unbounded, under the caller's deadline tightened to the
//!   configured timeout.
//!
//! Sub-tasks report over oneshot channels. Once the deadline fires the merge
//! returns immediately; a sub-task that finishes later sends into a dropped
//! receiver and its result is discarded.

use std::sync::Arc;
use std::time::Duration;

use fanout_lab_core::{
    duration_ms, CancelReason, ComposedOutcome, DependencyError, DependencyName, DependencyResult,
    Strategy,
};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info_span, warn, Instrument};

use super::config::{ConfigError, OrchestratorConfig};
use super::deadline::Deadline;
use super::gate::{Admission, BoundedGate, GateError};
use super::inflight::InFlightGauges;
use super::stub::{DependencyProfile, SimulatedDependency};
use crate::traits::{Dependency, ObservationSink};

/// What the B sub-task hands back to the merge step.
#[derive(Debug)]
struct BranchReport {
    result: DependencyResult,
    gate_wait: Option<Duration>,
}

/// Runs orchestration invocations. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Orchestrator {
    a: Arc<dyn Dependency>,
    b: Arc<dyn Dependency>,
    gate: Arc<BoundedGate>,
    sink: Arc<dyn ObservationSink>,
    in_flight: Arc<InFlightGauges>,
    timeout: Duration,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        a: Arc<dyn Dependency>,
        b: Arc<dyn Dependency>,
        gate: Arc<BoundedGate>,
        sink: Arc<dyn ObservationSink>,
        timeout: Duration,
    ) -> Self {
        Self {
            a,
            b,
            gate,
            sink,
            in_flight: Arc::new(InFlightGauges::new()),
            timeout,
        }
    }

    /// Builds an orchestrator over the simulated A and B dependencies.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(
        config: &OrchestratorConfig,
        sink: Arc<dyn ObservationSink>,
    ) -> Result<Self, ConfigError> {
        let capacity = config.validate()?;
        Ok(Self::new(
            Arc::new(SimulatedDependency::new(DependencyProfile::service_a())),
            Arc::new(SimulatedDependency::new(DependencyProfile::service_b(
                config.b_error_rate,
            ))),
            Arc::new(BoundedGate::new(capacity)),
            sink,
            config.timeout(),
        ))
    }

    #[must_use]
    pub fn gate(&self) -> &Arc<BoundedGate> {
        &self.gate
    }

    #[must_use]
    pub fn in_flight(&self) -> &Arc<InFlightGauges> {
        &self.in_flight
    }

    /// Deadline applied by the timeout strategy.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs one invocation of `strategy` under the caller's deadline.
    ///
    /// Always terminates with exactly one of success, dependency failure,
    /// or cancellation. The in-flight count for `strategy` is held for the
    /// lifetime of the returned future, including when it is dropped early.
    /// A future dropped before completing reports a caller cancellation.
    pub async fn execute(&self, strategy: Strategy, caller: Deadline) -> ComposedOutcome {
        let _in_flight = self.in_flight.enter(strategy, Arc::clone(&self.sink));
        let started = Instant::now();

        let span = info_span!(
            "orchestrate",
            strategy = %strategy,
            total_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let mut completion = Completion::new(self.sink.as_ref(), strategy, started);
            let outcome = match strategy {
                Strategy::Sequential => self.run_sequential(&caller, started).await,
                Strategy::Unbounded | Strategy::Bounded => {
                    self.fan_out(strategy, caller, started).await
                }
                Strategy::Timeout => {
                    let deadline = caller.tightened(self.timeout);
                    self.fan_out(strategy, deadline, started).await
                }
            };

            let total_ms = outcome.total_ms();
            tracing::Span::current().record("total_ms", total_ms);
            tracing::Span::current().record("outcome", outcome.kind.label());
            debug!(
                strategy = %strategy,
                total_ms,
                outcome = %outcome.kind,
                "orchestration complete"
            );

            completion.finish(&outcome);
            outcome
        }
        .instrument(span)
        .await
    }

    /// Sequential strategy: A, then B unless A failed.
    pub async fn sequential(&self, caller: Deadline) -> ComposedOutcome {
        self.execute(Strategy::Sequential, caller).await
    }

    /// Unbounded fan-out under the caller's deadline alone.
    pub async fn unbounded(&self, caller: Deadline) -> ComposedOutcome {
        self.execute(Strategy::Unbounded, caller).await
    }

    /// Fan-out with B admitted through the gate.
    pub async fn bounded(&self, caller: Deadline) -> ComposedOutcome {
        self.execute(Strategy::Bounded, caller).await
    }

    /// Fan-out under the caller's deadline tightened to [`Self::timeout`].
    pub async fn deadline_bounded(&self, caller: Deadline) -> ComposedOutcome {
        self.execute(Strategy::Timeout, caller).await
    }

    async fn run_sequential(&self, deadline: &Deadline, started: Instant) -> ComposedOutcome {
        let strategy = Strategy::Sequential;
        let a = call(self.a.as_ref(), deadline, strategy, self.sink.as_ref()).await;
        if !a.is_success() {
            return ComposedOutcome::short_circuited(strategy, a, started.elapsed());
        }

        let b = call(self.b.as_ref(), deadline, strategy, self.sink.as_ref()).await;
        ComposedOutcome::completed(strategy, a, b, None, started.elapsed())
    }

    /// Fan-out/fan-in shared by the three concurrent strategies.
    async fn fan_out(
        &self,
        strategy: Strategy,
        deadline: Deadline,
        started: Instant,
    ) -> ComposedOutcome {
        let (a_tx, mut a_rx) = oneshot::channel::<DependencyResult>();
        let (b_tx, mut b_rx) = oneshot::channel::<BranchReport>();

        tokio::spawn(
            {
                let dep = Arc::clone(&self.a);
                let sink = Arc::clone(&self.sink);
                let deadline = deadline.clone();
                async move {
                    let result = call(dep.as_ref(), &deadline, strategy, sink.as_ref()).await;
                    // The merge may already have returned; a closed receiver is fine.
                    let _ = a_tx.send(result);
                }
            }
            .in_current_span(),
        );

        tokio::spawn(
            {
                let dep = Arc::clone(&self.b);
                let sink = Arc::clone(&self.sink);
                let gate = (strategy == Strategy::Bounded).then(|| Arc::clone(&self.gate));
                let deadline = deadline.clone();
                async move {
                    let report = match gate {
                        Some(gate) => {
                            gated_call(&gate, dep.as_ref(), &deadline, strategy, sink.as_ref())
                                .await
                        }
                        None => BranchReport {
                            result: call(dep.as_ref(), &deadline, strategy, sink.as_ref()).await,
                            gate_wait: None,
                        },
                    };
                    let _ = b_tx.send(report);
                }
            }
            .in_current_span(),
        );

        let mut a: Option<DependencyResult> = None;
        let mut b: Option<DependencyResult> = None;
        let mut gate_wait: Option<Duration> = None;

        loop {
            match (a, b) {
                (Some(a), Some(b)) => {
                    return ComposedOutcome::completed(
                        strategy,
                        a,
                        b,
                        gate_wait,
                        started.elapsed(),
                    );
                }
                (pending_a, pending_b) => {
                    a = pending_a;
                    b = pending_b;
                }
            }

            tokio::select! {
                received = &mut a_rx, if a.is_none() => {
                    a = Some(received.unwrap_or_else(|_| unreported(DependencyName::A)));
                }
                received = &mut b_rx, if b.is_none() => {
                    let report = received.unwrap_or_else(|_| BranchReport {
                        result: unreported(DependencyName::B),
                        gate_wait: None,
                    });
                    gate_wait = report.gate_wait;
                    b = Some(report.result);
                }
                reason = deadline.expired() => {
                    debug!(%strategy, %reason, a_done = a.is_some(), b_done = b.is_some(),
                        "deadline fired before fan-in completed");
                    return ComposedOutcome::cancelled(
                        strategy,
                        reason,
                        a,
                        b,
                        gate_wait,
                        started.elapsed(),
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("gate", &self.gate)
            .field("in_flight", &self.in_flight)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Reports the terminal outcome of one invocation exactly once.
///
/// Dropped without [`Completion::finish`] means the caller went away
/// mid-flight; that is reported as a caller cancellation.
struct Completion<'a> {
    sink: &'a dyn ObservationSink,
    strategy: Strategy,
    started: Instant,
    finished: bool,
}

impl<'a> Completion<'a> {
    fn new(sink: &'a dyn ObservationSink, strategy: Strategy, started: Instant) -> Self {
        Self {
            sink,
            strategy,
            started,
            finished: false,
        }
    }

    fn finish(&mut self, outcome: &ComposedOutcome) {
        self.finished = true;
        self.sink.invocation_completed(outcome);
    }
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let outcome = ComposedOutcome::cancelled(
            self.strategy,
            CancelReason::Caller,
            None,
            None,
            None,
            self.started.elapsed(),
        );
        debug!(
            strategy = %self.strategy,
            total_ms = outcome.total_ms(),
            "orchestration dropped before completion"
        );
        self.sink.invocation_completed(&outcome);
    }
}

/// Invokes one dependency, timing the call and reporting it to the sink.
async fn call(
    dep: &dyn Dependency,
    deadline: &Deadline,
    strategy: Strategy,
    sink: &dyn ObservationSink,
) -> DependencyResult {
    let span = info_span!(
        "dependency",
        dependency = %dep.name(),
        strategy = %strategy,
        status = tracing::field::Empty,
        sleep_ms = tracing::field::Empty,
        elapsed_ms = tracing::field::Empty,
    );

    let started = Instant::now();
    let outcome = dep.invoke(deadline).instrument(span.clone()).await;
    let result = DependencyResult::from_call(outcome, started.elapsed());

    span.record("status", result.status());
    if let Some(payload) = result.payload() {
        span.record("sleep_ms", payload.sleep_ms);
    }
    span.record("elapsed_ms", duration_ms(result.elapsed()));

    sink.dependency_completed(strategy, dep.name(), &result);
    result
}

/// B's path under the bounded strategy: gate admission, then the call.
///
/// The token lives in this frame only, so it is released on every exit:
/// normal return, cancellation inside the call, or the task being dropped.
async fn gated_call(
    gate: &BoundedGate,
    dep: &dyn Dependency,
    deadline: &Deadline,
    strategy: Strategy,
    sink: &dyn ObservationSink,
) -> BranchReport {
    match gate.acquire(deadline).await {
        Ok(Admission { token, waited }) => {
            sink.gate_waited(strategy, waited, true);
            let result = call(dep, deadline, strategy, sink).await;
            token.release();
            BranchReport {
                result,
                gate_wait: Some(waited),
            }
        }
        Err(err) => {
            let waited = err.waited();
            sink.gate_waited(strategy, waited, false);
            let cause = match &err {
                GateError::Cancelled { reason, .. } => DependencyError::Cancelled(*reason),
                GateError::Closed => DependencyError::failed(err.to_string()),
            };
            BranchReport {
                result: DependencyResult::Failure {
                    cause,
                    elapsed: Duration::ZERO,
                },
                gate_wait: Some(waited),
            }
        }
    }
}

/// Result used when a sub-task ended without sending (it panicked).
fn unreported(name: DependencyName) -> DependencyResult {
    warn!(dependency = %name, "sub-task ended without reporting a result");
    DependencyResult::Failure {
        cause: DependencyError::failed(format!("dependency {name} task ended without reporting")),
        elapsed: Duration::ZERO,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
