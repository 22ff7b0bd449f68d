//! `fanout-lab` server: orchestrates two simulated dependencies under four
//! composition strategies and exposes them over HTTP.

pub mod network;
pub mod service;
pub mod traits;

pub use service::{Deadline, Orchestrator, OrchestratorConfig};
pub use traits::{Dependency, ObservationSink};
