use std::time::Duration;

use async_trait::async_trait;
use fanout_lab_core::{
    ComposedOutcome, DependencyError, DependencyName, DependencyResult, Payload, Strategy,
};

use crate::service::deadline::Deadline;

/// A downstream dependency invoked once per sub-task.
///
/// Implementations must honor the deadline: once it fires, the call returns
/// `DependencyError::Cancelled` instead of answering late.
/// Implementations: simulated stub (`SimulatedDependency`), scripted doubles (tests).
#[async_trait]
pub trait Dependency: Send + Sync {
    /// Which dependency this is (A or B).
    fn name(&self) -> DependencyName;

    /// Perform one call. No retries.
    async fn invoke(&self, deadline: &Deadline) -> Result<Payload, DependencyError>;
}

/// Narrow recording interface the orchestrator reports into.
///
/// All methods are synchronous and must not block: they run on the
/// orchestration and sub-task paths.
pub trait ObservationSink: Send + Sync {
    /// One dependency call finished (success, failure, or cancellation).
    fn dependency_completed(
        &self,
        strategy: Strategy,
        dependency: DependencyName,
        result: &DependencyResult,
    );

    /// A gate admission attempt ended, granted or not, after `waited`.
    fn gate_waited(&self, strategy: Strategy, waited: Duration, admitted: bool);

    /// One invocation reached its terminal outcome.
    fn invocation_completed(&self, outcome: &ComposedOutcome);

    /// The in-flight count for `strategy` moved by `delta` (+1 or -1).
    fn in_flight_adjusted(&self, strategy: Strategy, delta: i64);
}
