//! `fanout-lab-server` entry point.
//!
//! ```sh
//! B_CONCURRENCY_LIMIT=5 ASYNC_TIMEOUT_MS=400 fanout-lab-server --port 8080
//! ```
//!
//! Serves `/sync`, `/async`, `/async-limited`, `/async-timeout`, the health
//! probes, and `/metrics`. Stops on Ctrl-C or SIGTERM after draining.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use fanout_lab_server::network::{NetworkConfig, NetworkModule};
use fanout_lab_server::service::observe::install_prometheus_recorder;
use fanout_lab_server::service::{
    BackgroundWorker, MetricsSink, MetricsUpkeep, Orchestrator, OrchestratorConfig,
};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const METRICS_UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "fanout-lab-server")]
#[command(about = "Compare sequential, fan-out, bounded and deadline-bound orchestration")]
struct Args {
    /// Bind address for the HTTP server.
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    host: String,

    /// HTTP port to listen on.
    #[arg(short, long, default_value_t = 8080, env = "PORT")]
    port: u16,

    /// Deadline applied by `/async-timeout`, in milliseconds.
    #[arg(long, default_value_t = 600, env = "ASYNC_TIMEOUT_MS")]
    async_timeout_ms: u64,

    /// Gate capacity for B calls made by `/async-limited`.
    #[arg(long, default_value_t = 20, env = "B_CONCURRENCY_LIMIT")]
    b_concurrency_limit: u32,

    /// Probability that a B call fails immediately.
    #[arg(long, default_value_t = 0.05, env = "B_ERROR_RATE")]
    b_error_rate: f64,

    /// Outer bound on any single HTTP request, in seconds.
    #[arg(long, default_value_t = 30, env = "REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: u64,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, env = "LOG_FORMAT")]
    log_format: LogFormat,
}

impl Args {
    fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            gate_capacity: self.b_concurrency_limit,
            timeout_ms: self.async_timeout_ms,
            b_error_rate: self.b_error_rate,
        }
    }

    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..NetworkConfig::default()
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = args.orchestrator_config();
    let metrics = install_prometheus_recorder().context("failed to install metrics recorder")?;
    let orchestrator = Orchestrator::from_config(&config, Arc::new(MetricsSink))
        .context("invalid orchestrator configuration")?;

    info!(
        gate_capacity = config.gate_capacity,
        timeout_ms = config.timeout_ms,
        b_error_rate = config.b_error_rate,
        "orchestrator configured"
    );

    let mut upkeep = BackgroundWorker::start(
        MetricsUpkeep::new(orchestrator.clone(), Some(metrics.clone())),
        METRICS_UPKEEP_INTERVAL,
    );

    let mut module = NetworkModule::new(args.network_config(), orchestrator, Some(metrics));
    let port = module.start().await.context("failed to bind HTTP listener")?;
    info!(host = %args.host, port, "fanout-lab-server listening");

    let result = module.serve(shutdown_signal()).await;
    upkeep.stop().await;
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let args = Args::try_parse_from(["fanout-lab-server"]).unwrap();
        let config = args.orchestrator_config();

        assert_eq!(config.gate_capacity, 20);
        assert_eq!(config.timeout_ms, 600);
        assert!((config.b_error_rate - 0.05).abs() < f64::EPSILON);
        assert_eq!(args.port, 8080);
        assert_eq!(args.log_format, LogFormat::Pretty);
        assert_eq!(
            args.network_config().request_timeout,
            Duration::from_secs(30)
        );
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "fanout-lab-server",
            "--port",
            "9000",
            "--b-concurrency-limit",
            "1",
            "--async-timeout-ms",
            "250",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(args.network_config().bind_addr(), "0.0.0.0:9000");
        assert_eq!(args.orchestrator_config().gate_capacity, 1);
        assert_eq!(args.orchestrator_config().timeout_ms, 250);
        assert_eq!(args.log_format, LogFormat::Json);
    }

    #[test]
    fn zero_capacity_is_rejected_at_startup() {
        let args =
            Args::try_parse_from(["fanout-lab-server", "--b-concurrency-limit", "0"]).unwrap();
        assert!(args.orchestrator_config().validate().is_err());
    }

    #[test]
    fn args_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
