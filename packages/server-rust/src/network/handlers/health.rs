//! Health, liveness, and readiness endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use fanout_lab_core::Strategy;
use serde_json::{json, Map, Value};

use super::AppState;

/// Returns detailed health information as JSON.
///
/// Always 200; the `state` field says whether the server is actually
/// accepting work.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let health = state.shutdown.health_state();
    let gauges = state.orchestrator.in_flight();
    let gate = state.orchestrator.gate();

    let in_flight: Map<String, Value> = Strategy::ALL
        .into_iter()
        .map(|s| (s.as_str().to_string(), json!(gauges.get(s))))
        .collect();

    Json(json!({
        "state": health.as_str(),
        "in_flight": in_flight,
        "in_flight_total": gauges.total(),
        "gate": {
            "occupancy": gate.occupancy(),
            "capacity": gate.capacity(),
            "closed": gate.is_closed(),
        },
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe: 200 whenever the process answers.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 in `Ready`, 503 while starting, draining or stopped.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state().accepts_requests() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::network::handlers::test_support;
    use crate::service::NoopSink;

    fn test_state() -> AppState {
        test_support::state(test_support::orchestrator(10, 10, 0.0, 4))
    }

    #[tokio::test]
    async fn health_handler_reports_gate_and_in_flight() {
        let state = test_state();
        let _guard = state
            .orchestrator
            .in_flight()
            .enter(Strategy::Timeout, Arc::new(NoopSink));

        let json = health_handler(State(state)).await.0;

        assert_eq!(json["state"], "ready");
        assert_eq!(json["in_flight"]["async-timeout"], 1);
        assert_eq!(json["in_flight"]["sync"], 0);
        assert_eq!(json["in_flight_total"], 1);
        assert_eq!(json["gate"]["occupancy"], 0);
        assert_eq!(json["gate"]["capacity"], 4);
        assert_eq!(json["gate"]["closed"], false);
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn health_handler_reports_draining_state() {
        let state = test_state();
        state.shutdown.trigger_shutdown();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["state"], "draining");
    }

    #[tokio::test]
    async fn liveness_handler_always_returns_200() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_health_state() {
        let state = test_state();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);

        state.shutdown.trigger_shutdown();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
