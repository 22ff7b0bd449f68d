//! Background worker for periodic housekeeping.
//!
//! Provides `BackgroundWorker`, which drives any `BackgroundRunnable` on a
//! fixed tick until stopped. The server runs one: [`MetricsUpkeep`],
//! which samples gate occupancy and drains the Prometheus recorder's
//! histogram buffers.

use std::time::Duration;

use async_trait::async_trait;
use metrics::gauge;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::observe::GATE_OCCUPANCY;
use super::orchestrator::Orchestrator;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Work executed by a `BackgroundWorker`.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// Name used in log lines.
    fn name(&self) -> &'static str;

    /// Called once per tick interval.
    async fn on_tick(&mut self);

    /// Called once when the worker is shutting down. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Spawned tokio task that calls `on_tick()` every interval and
/// `shutdown()` once when stopped.
pub struct BackgroundWorker {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl BackgroundWorker {
    /// Starts the worker. The first tick fires one full interval after start.
    pub fn start<R: BackgroundRunnable>(mut runnable: R, tick_interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => runnable.on_tick().await,
                    _ = &mut shutdown_rx => break,
                }
            }

            debug!(worker = runnable.name(), "background worker stopping");
            runnable.shutdown().await;
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the worker and waits for its task to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsUpkeep
// ---------------------------------------------------------------------------

/// Periodic metrics housekeeping.
///
/// Histograms in `metrics-exporter-prometheus` buffer samples until upkeep
/// runs; without it the buffers grow between scrapes.
pub struct MetricsUpkeep {
    orchestrator: Orchestrator,
    handle: Option<PrometheusHandle>,
}

impl MetricsUpkeep {
    #[must_use]
    pub fn new(orchestrator: Orchestrator, handle: Option<PrometheusHandle>) -> Self {
        Self {
            orchestrator,
            handle,
        }
    }

    fn sample(&self) {
        gauge!(GATE_OCCUPANCY).set(f64::from(self.orchestrator.gate().occupancy()));
        if let Some(handle) = &self.handle {
            handle.run_upkeep();
        }
    }
}

#[async_trait]
impl BackgroundRunnable for MetricsUpkeep {
    fn name(&self) -> &'static str {
        "metrics-upkeep"
    }

    async fn on_tick(&mut self) {
        self.sample();
    }

    async fn shutdown(&mut self) {
        self.sample();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
