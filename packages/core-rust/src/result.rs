use std::fmt;
use std::time::Duration;

use crate::types::{CancelReason, Payload};

/// Why a dependency call did not produce a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DependencyError {
    /// The dependency itself reported an error.
    #[error("{message}")]
    Failed { message: String },
    /// The call was abandoned because its deadline fired.
    #[error("{0}")]
    Cancelled(CancelReason),
}

impl DependencyError {
    /// Shorthand for a `Failed` error with the given message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Returns the cancellation reason, if this error is a cancellation.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            Self::Cancelled(reason) => Some(*reason),
            Self::Failed { .. } => None,
        }
    }
}

/// Result of exactly one dependency invocation.
///
/// Produced once by the sub-task that made the call, then moved into the
/// fan-in step. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyResult {
    Success { payload: Payload, elapsed: Duration },
    Failure { cause: DependencyError, elapsed: Duration },
}

impl DependencyResult {
    /// Builds a result from the raw call outcome and its measured duration.
    #[must_use]
    pub fn from_call(outcome: Result<Payload, DependencyError>, elapsed: Duration) -> Self {
        match outcome {
            Ok(payload) => Self::Success { payload, elapsed },
            Err(cause) => Self::Failure { cause, elapsed },
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Time spent inside the dependency call.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Success { elapsed, .. } | Self::Failure { elapsed, .. } => *elapsed,
        }
    }

    #[must_use]
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Success { payload, .. } => Some(payload),
            Self::Failure { .. } => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&DependencyError> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { cause, .. } => Some(cause),
        }
    }

    /// Returns the cancellation reason when the call was abandoned.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.error().and_then(DependencyError::cancel_reason)
    }

    /// Short status label: `ok`, `error`, or `cancelled`.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "ok",
            Self::Failure {
                cause: DependencyError::Failed { .. },
                ..
            } => "error",
            Self::Failure {
                cause: DependencyError::Cancelled(_),
                ..
            } => "cancelled",
        }
    }
}

impl fmt::Display for DependencyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { .. } => f.write_str("ok"),
            Self::Failure { cause, .. } => write!(f, "{cause}"),
        }
    }
}
