//! HTTP handler definitions.
//!
//! Defines `AppState` (the shared state carried through axum extractors)
//! and re-exports the handler functions used to build the router.

pub mod health;
pub mod metrics;
pub mod strategy;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use metrics::metrics_handler;
pub use strategy::{
    async_handler, async_limited_handler, async_timeout_handler, sync_handler, FailureBody,
    SuccessBody,
};

use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusHandle;

use super::ShutdownController;
use crate::service::Orchestrator;

/// Shared application state passed to all axum handlers via `State`.
///
/// Every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    /// Health state and drain tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Render handle of the installed Prometheus recorder, if any.
    pub metrics: Option<PrometheusHandle>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
