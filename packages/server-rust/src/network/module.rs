//! Network module with deferred startup lifecycle.
//!
//! `new()` creates shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until the shutdown future resolves. The
//! split lets the binary spawn background workers against the shared
//! orchestrator between `start()` and `serve()`.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    async_handler, async_limited_handler, async_timeout_handler, health_handler,
    liveness_handler, metrics_handler, readiness_handler, sync_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::service::Orchestrator;

/// Owns the HTTP server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    orchestrator: Orchestrator,
    metrics: Option<PrometheusHandle>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(
        config: NetworkConfig,
        orchestrator: Orchestrator,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let shutdown = Arc::new(ShutdownController::new(Arc::clone(
            orchestrator.in_flight(),
        )));
        Self {
            config,
            listener: None,
            orchestrator,
            metrics,
            shutdown,
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /sync`, `/async`, `/async-limited`, `/async-timeout` -- strategies
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live`, `/health/ready` -- probes
    /// - `GET /metrics` -- Prometheus text
    pub fn build_router(&self) -> Router {
        let state = AppState {
            orchestrator: self.orchestrator.clone(),
            shutdown: Arc::clone(&self.shutdown),
            metrics: self.metrics.clone(),
            start_time: Instant::now(),
        };

        Router::new()
            .route("/sync", get(sync_handler))
            .route("/async", get(async_handler))
            .route("/async-limited", get(async_limited_handler))
            .route("/async-timeout", get(async_timeout_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener and returns the bound port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves, then drains.
    ///
    /// After the shutdown signal:
    /// 1. Health state transitions to Draining; strategy routes answer 503
    /// 2. The B gate closes, releasing queued waiters
    /// 3. Open connections finish their current requests
    /// 4. Waits up to `drain_timeout` for in-flight orchestrations
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a
    /// fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();

        let shutdown_ctrl = Arc::clone(&self.shutdown);
        let gate = Arc::clone(self.orchestrator.gate());
        let on_signal = async move {
            shutdown.await;
            shutdown_ctrl.trigger_shutdown();
            gate.close();
        };

        self.shutdown.set_ready();
        info!("Serving HTTP connections");

        axum::serve(listener, router)
            .with_graceful_shutdown(on_signal)
            .await?;

        if self.shutdown.wait_for_drain(self.config.drain_timeout).await {
            info!("All in-flight orchestrations drained");
        } else {
            warn!(
                remaining = self.shutdown.in_flight_count(),
                "Drain timeout expired with orchestrations still in flight"
            );
        }
        Ok(())
    }
}
