use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Composition strategy applied to one orchestration invocation.
///
/// The wire name (`as_str`) doubles as the HTTP path segment, the JSON
/// `mode` field, and the `endpoint` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Call A, then B. B is skipped when A fails.
    #[serde(rename = "sync")]
    Sequential,
    /// Fan out A and B with no bound on concurrent B calls.
    #[serde(rename = "async")]
    Unbounded,
    /// Fan out A and B; B must first pass the bounded admission gate.
    #[serde(rename = "async-limited")]
    Bounded,
    /// Fan out A and B under a fixed per-invocation deadline.
    #[serde(rename = "async-timeout")]
    Timeout,
}

impl Strategy {
    /// Number of strategies.
    pub const COUNT: usize = 4;

    /// All strategies, in a stable order usable as an array index.
    pub const ALL: [Strategy; Self::COUNT] = [
        Strategy::Sequential,
        Strategy::Unbounded,
        Strategy::Bounded,
        Strategy::Timeout,
    ];

    /// Returns the wire name of the strategy.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sync",
            Self::Unbounded => "async",
            Self::Bounded => "async-limited",
            Self::Timeout => "async-timeout",
        }
    }

    /// Position of this strategy within [`Strategy::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Sequential => 0,
            Self::Unbounded => 1,
            Self::Bounded => 2,
            Self::Timeout => 3,
        }
    }

    /// Whether the strategy runs A and B as concurrent sub-tasks.
    #[must_use]
    pub fn is_concurrent(self) -> bool {
        !matches!(self, Self::Sequential)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown strategy name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown strategy: {0}")]
pub struct UnknownStrategy(pub String);

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

/// Identifies one of the two downstream dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyName {
    /// Fast, stable dependency.
    A,
    /// Slow dependency with intermittent failures.
    B,
}

impl DependencyName {
    /// Label value used in metrics and error summaries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }
}

impl fmt::Display for DependencyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful dependency payload: a fixed marker plus the simulated delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    /// Marker identifying which dependency produced the payload.
    pub value: String,
    /// Delay the dependency slept before answering.
    pub sleep_ms: u64,
}

/// Why a pending operation was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The inbound cancellation signal fired (client disconnect, upstream cancel).
    Caller,
    /// The invocation's expiry instant elapsed.
    DeadlineExceeded,
}

impl CancelReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Caller => "cancelled by caller",
            Self::DeadlineExceeded => "deadline exceeded",
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
