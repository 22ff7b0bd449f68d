//! Per-invocation deadline shared by every sub-task of one orchestration.
//!
//! A `Deadline` combines the inbound cancellation signal with an optional
//! monotonic expiry instant. Whichever fires first wins. Clones share the
//! same signal and expiry, so the orchestrator and both sub-tasks observe
//! one deadline.

use std::time::Duration;

use fanout_lab_core::CancelReason;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct Deadline {
    signal: CancellationToken,
    expires_at: Option<Instant>,
}

impl Deadline {
    /// Deadline that fires only when `signal` is cancelled.
    #[must_use]
    pub fn from_signal(signal: CancellationToken) -> Self {
        Self {
            signal,
            expires_at: None,
        }
    }

    /// Deadline that fires when `signal` is cancelled or `timeout` elapses.
    #[must_use]
    pub fn after(signal: CancellationToken, timeout: Duration) -> Self {
        Self {
            signal,
            expires_at: Some(Instant::now() + timeout),
        }
    }

    /// Same signal, with the expiry pulled in to at most `timeout` from now.
    #[must_use]
    pub fn tightened(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let expires_at = match self.expires_at {
            Some(existing) if existing <= candidate => existing,
            _ => candidate,
        };
        Self {
            signal: self.signal.clone(),
            expires_at: Some(expires_at),
        }
    }

    /// Resolves once the deadline fires, reporting which side fired.
    ///
    /// Cancel-safe: dropping the future before it resolves has no effect.
    pub async fn expired(&self) -> CancelReason {
        match self.expires_at {
            Some(at) => tokio::select! {
                () = self.signal.cancelled() => CancelReason::Caller,
                () = tokio::time::sleep_until(at) => CancelReason::DeadlineExceeded,
            },
            None => {
                self.signal.cancelled().await;
                CancelReason::Caller
            }
        }
    }

    /// Non-blocking check; returns the reason if the deadline already fired.
    #[must_use]
    pub fn check(&self) -> Option<CancelReason> {
        if self.signal.is_cancelled() {
            return Some(CancelReason::Caller);
        }
        match self.expires_at {
            Some(at) if Instant::now() >= at => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.check().is_some()
    }

    /// Time left until expiry, or `None` when only the signal bounds it.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}
