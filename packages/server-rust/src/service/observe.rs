//! Observation sinks: where the orchestrator reports latencies and outcomes.
//!
//! - [`MetricsSink`]: records through the `metrics` facade, exported in
//!   Prometheus text format by `metrics-exporter-prometheus`
//! - [`NoopSink`]: discards everything (tests, benchmarks)
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `service_duration_ms` | Histogram | `service` |
//! | `service_errors_total` | Counter | `service`, `kind` |
//! | `serviceB_semaphore_wait_ms` | Histogram | `endpoint`, `admitted` |
//! | `serviceB_gate_occupancy` | Gauge | |
//! | `http_inflight` | Gauge | `endpoint` |
//! | `orchestration_duration_ms` | Histogram | `endpoint`, `outcome` |
//! | `orchestration_outcomes_total` | Counter | `endpoint`, `outcome` |
//! | `http_requests_total` | Counter | `endpoint`, `status` |
//! | `http_request_duration_ms` | Histogram | `endpoint`, `status` |

use std::time::Duration;

use fanout_lab_core::{ComposedOutcome, DependencyName, DependencyResult, Strategy};
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

use crate::traits::ObservationSink;

pub const SERVICE_DURATION_MS: &str = "service_duration_ms";
pub const SERVICE_ERRORS_TOTAL: &str = "service_errors_total";
pub const SEMAPHORE_WAIT_MS: &str = "serviceB_semaphore_wait_ms";
pub const GATE_OCCUPANCY: &str = "serviceB_gate_occupancy";
pub const IN_FLIGHT: &str = "http_inflight";
pub const ORCHESTRATION_DURATION_MS: &str = "orchestration_duration_ms";
pub const ORCHESTRATION_OUTCOMES_TOTAL: &str = "orchestration_outcomes_total";
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_MS: &str = "http_request_duration_ms";

/// Histogram buckets (milliseconds) covering A's range up to B's tail.
pub const LATENCY_BUCKETS_MS: &[f64] = &[
    5.0, 10.0, 25.0, 50.0, 100.0, 150.0, 250.0, 400.0, 600.0, 800.0, 1000.0, 1200.0, 1500.0,
    2500.0, 5000.0,
];

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

// ---------------------------------------------------------------------------
// MetricsSink
// ---------------------------------------------------------------------------

/// Records through whatever `metrics` recorder is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSink;

impl ObservationSink for MetricsSink {
    fn dependency_completed(
        &self,
        _strategy: Strategy,
        dependency: DependencyName,
        result: &DependencyResult,
    ) {
        let service = dependency.as_str();
        histogram!(SERVICE_DURATION_MS, "service" => service).record(millis(result.elapsed()));
        if !result.is_success() {
            counter!(SERVICE_ERRORS_TOTAL, "service" => service, "kind" => result.status())
                .increment(1);
        }
    }

    fn gate_waited(&self, strategy: Strategy, waited: Duration, admitted: bool) {
        let admitted = if admitted { "true" } else { "false" };
        histogram!(SEMAPHORE_WAIT_MS, "endpoint" => strategy.as_str(), "admitted" => admitted)
            .record(millis(waited));
    }

    fn invocation_completed(&self, outcome: &ComposedOutcome) {
        let endpoint = outcome.strategy.as_str();
        let kind = outcome.kind.label();
        histogram!(ORCHESTRATION_DURATION_MS, "endpoint" => endpoint, "outcome" => kind)
            .record(millis(outcome.total));
        counter!(ORCHESTRATION_OUTCOMES_TOTAL, "endpoint" => endpoint, "outcome" => kind)
            .increment(1);
    }

    #[allow(clippy::cast_precision_loss)]
    fn in_flight_adjusted(&self, strategy: Strategy, delta: i64) {
        let gauge = gauge!(IN_FLIGHT, "endpoint" => strategy.as_str());
        if delta >= 0 {
            gauge.increment(delta as f64);
        } else {
            gauge.decrement(delta.unsigned_abs() as f64);
        }
    }
}

/// Front-door request accounting, labelled like the orchestration metrics.
pub fn record_http_request(strategy: Strategy, status: u16, elapsed: Duration) {
    let endpoint = strategy.as_str();
    let status = status.to_string();
    counter!(HTTP_REQUESTS_TOTAL, "endpoint" => endpoint, "status" => status.clone()).increment(1);
    histogram!(HTTP_REQUEST_DURATION_MS, "endpoint" => endpoint, "status" => status)
        .record(millis(elapsed));
}

/// Registers descriptions and units with the installed recorder.
pub fn describe_metrics() {
    describe_histogram!(SERVICE_DURATION_MS, Unit::Milliseconds, "Dependency call latency");
    describe_counter!(SERVICE_ERRORS_TOTAL, "Dependency calls that failed or were cancelled");
    describe_histogram!(
        SEMAPHORE_WAIT_MS,
        Unit::Milliseconds,
        "Time spent queued for a B gate token"
    );
    describe_gauge!(GATE_OCCUPANCY, "B gate tokens currently held");
    describe_gauge!(IN_FLIGHT, "Orchestration invocations currently in flight");
    describe_histogram!(
        ORCHESTRATION_DURATION_MS,
        Unit::Milliseconds,
        "Total orchestration latency by outcome"
    );
    describe_counter!(ORCHESTRATION_OUTCOMES_TOTAL, "Orchestration outcomes by kind");
    describe_counter!(HTTP_REQUESTS_TOTAL, "HTTP requests by endpoint and status");
    describe_histogram!(
        HTTP_REQUEST_DURATION_MS,
        Unit::Milliseconds,
        "HTTP request latency by endpoint and status"
    );
}

/// Installs the global Prometheus recorder and returns the render handle.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the bucket
/// configuration is rejected.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("_ms".to_string()), LATENCY_BUCKETS_MS)?
        .install_recorder()?;
    describe_metrics();
    Ok(handle)
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// Sink that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ObservationSink for NoopSink {
    fn dependency_completed(&self, _: Strategy, _: DependencyName, _: &DependencyResult) {}

    fn gate_waited(&self, _: Strategy, _: Duration, _: bool) {}

    fn invocation_completed(&self, _: &ComposedOutcome) {}

    fn in_flight_adjusted(&self, _: Strategy, _: i64) {}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
