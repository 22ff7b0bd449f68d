//! Orchestration core.
//!
//! 1. **Deadline** (`deadline`): caller cancellation signal plus optional expiry
//! 2. **Gate** (`gate`): bounded FIFO admission in front of dependency B
//! 3. **Stubs** (`stub`): simulated A and B with latency and error profiles
//! 4. **Orchestrator** (`orchestrator`): the four composition strategies
//! 5. **Observation** (`observe`, `inflight`): metrics sink and in-flight gauges
//! 6. **Background workers** (`worker`): periodic metrics upkeep

pub mod config;
pub mod deadline;
pub mod gate;
pub mod inflight;
pub mod observe;
pub mod orchestrator;
pub mod stub;
pub mod worker;

// Re-export key types for convenient access.
pub use config::{ConfigError, OrchestratorConfig};
pub use deadline::Deadline;
pub use gate::{Admission, BoundedGate, GateError, GateToken};
pub use inflight::{InFlightGauges, InFlightGuard};
pub use observe::{MetricsSink, NoopSink};
pub use orchestrator::Orchestrator;
pub use stub::{DelayModel, DependencyProfile, SimulatedDependency};
pub use worker::{BackgroundRunnable, BackgroundWorker, MetricsUpkeep};
