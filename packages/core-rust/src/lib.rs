//! Fanout lab core: composition strategies, dependency results, and composed outcomes.

pub mod outcome;
pub mod result;
pub mod types;

pub use outcome::{duration_ms, ComposedOutcome, OutcomeKind};
pub use result::{DependencyError, DependencyResult};
pub use types::{CancelReason, DependencyName, Payload, Strategy, UnknownStrategy};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
