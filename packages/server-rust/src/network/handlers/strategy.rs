//! Strategy endpoints: one route per composition strategy.
//!
//! Each request gets its own cancellation signal. The handler holds the
//! signal's drop guard, so when the client disconnects (or the outer
//! timeout fires) and axum drops the handler future, every pending
//! dependency call and gate wait of that request is cancelled.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fanout_lab_core::{ComposedOutcome, DependencyName, OutcomeKind, Payload, Strategy};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::AppState;
use crate::service::observe::record_http_request;
use crate::service::Deadline;

/// 200 response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessBody {
    pub service_a: Payload,
    pub service_b: Payload,
    pub mode: Strategy,
    pub total_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_wait_ms: Option<u64>,
}

/// 503 and 408 response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureBody {
    pub mode: Strategy,
    pub total_ms: u64,
    pub error: String,
}

pub async fn sync_handler(State(state): State<AppState>) -> Response {
    run_strategy(&state, Strategy::Sequential).await
}

pub async fn async_handler(State(state): State<AppState>) -> Response {
    run_strategy(&state, Strategy::Unbounded).await
}

pub async fn async_limited_handler(State(state): State<AppState>) -> Response {
    run_strategy(&state, Strategy::Bounded).await
}

pub async fn async_timeout_handler(State(state): State<AppState>) -> Response {
    run_strategy(&state, Strategy::Timeout).await
}

async fn run_strategy(state: &AppState, strategy: Strategy) -> Response {
    let mut record = RequestRecord::new(strategy);

    let response = if state.shutdown.health_state().accepts_requests() {
        let signal = CancellationToken::new();
        let _disconnect = signal.clone().drop_guard();
        let outcome = state
            .orchestrator
            .execute(strategy, Deadline::from_signal(signal))
            .await;
        render(&outcome)
    } else {
        let body = FailureBody {
            mode: strategy,
            total_ms: 0,
            error: "server is not accepting requests".to_string(),
        };
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    };

    record.status = Some(response.status());
    response
}

/// Records the request once, when the handler future ends.
///
/// A handler dropped before answering (client disconnect, outer timeout)
/// is recorded as 408.
struct RequestRecord {
    strategy: Strategy,
    started: Instant,
    status: Option<StatusCode>,
}

impl RequestRecord {
    fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            started: Instant::now(),
            status: None,
        }
    }
}

impl Drop for RequestRecord {
    fn drop(&mut self) {
        let status = self.status.unwrap_or(StatusCode::REQUEST_TIMEOUT);
        record_http_request(self.strategy, status.as_u16(), self.started.elapsed());
    }
}

/// Maps a terminal outcome to a response carrying its status code.
fn render(outcome: &ComposedOutcome) -> Response {
    let failure = |status: StatusCode, error: String| {
        let body = FailureBody {
            mode: outcome.strategy,
            total_ms: outcome.total_ms(),
            error,
        };
        (status, Json(body)).into_response()
    };

    match outcome.kind {
        OutcomeKind::Success => {
            match (
                outcome.payload(DependencyName::A),
                outcome.payload(DependencyName::B),
            ) {
                (Some(a), Some(b)) => {
                    let body = SuccessBody {
                        service_a: a.clone(),
                        service_b: b.clone(),
                        mode: outcome.strategy,
                        total_ms: outcome.total_ms(),
                        gate_wait_ms: outcome.gate_wait_ms(),
                    };
                    (StatusCode::OK, Json(body)).into_response()
                }
                _ => {
                    warn!(strategy = %outcome.strategy, "success outcome without both payloads");
                    failure(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "incomplete success outcome".to_string(),
                    )
                }
            }
        }
        OutcomeKind::DependencyFailure => failure(
            StatusCode::SERVICE_UNAVAILABLE,
            outcome.error_message().unwrap_or_default(),
        ),
        OutcomeKind::Cancelled(_) => failure(
            StatusCode::REQUEST_TIMEOUT,
            outcome.error_message().unwrap_or_default(),
        ),
    }
}
