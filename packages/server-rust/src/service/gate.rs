//! Bounded admission gate for dependency B.
//!
//! Unlike load shedding, a caller that finds the gate full queues for a
//! token until one is released or its deadline fires. Tokens are RAII
//! guards: every exit path from the holding task returns the slot.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use fanout_lab_core::CancelReason;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::service::deadline::Deadline;

// ---------------------------------------------------------------------------
// BoundedGate
// ---------------------------------------------------------------------------

/// Counting gate with a fixed capacity.
///
/// Backed by a FIFO-fair `tokio::sync::Semaphore`; waiters are admitted in
/// arrival order. Under sustained overload waiters may still starve until
/// their deadline fires, which shows up as cancelled gate waits.
#[derive(Debug)]
pub struct BoundedGate {
    semaphore: Arc<Semaphore>,
    capacity: NonZeroU32,
}

impl BoundedGate {
    #[must_use]
    pub fn new(capacity: NonZeroU32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity.get() as usize)),
            capacity,
        }
    }

    /// Waits for a token until one is free or `deadline` fires.
    ///
    /// When a slot frees up at the same moment the deadline fires, the
    /// token wins. A deadline that already fired on entry is reported
    /// without touching the semaphore.
    ///
    /// # Errors
    ///
    /// `GateError::Cancelled` if the deadline fired first (occupancy is
    /// unchanged), `GateError::Closed` after [`BoundedGate::close`].
    pub async fn acquire(&self, deadline: &Deadline) -> Result<Admission, GateError> {
        let started = Instant::now();
        if let Some(reason) = deadline.check() {
            return Err(GateError::Cancelled {
                reason,
                waited: Duration::ZERO,
            });
        }

        let acquired = tokio::select! {
            biased;
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit,
            reason = deadline.expired() => {
                return Err(GateError::Cancelled {
                    reason,
                    waited: started.elapsed(),
                });
            }
        };

        let permit = acquired.map_err(|_| GateError::Closed)?;
        Ok(Admission {
            token: GateToken { _permit: permit },
            waited: started.elapsed(),
        })
    }

    /// Number of tokens currently held.
    #[must_use]
    pub fn occupancy(&self) -> u32 {
        let available = u32::try_from(self.semaphore.available_permits())
            .unwrap_or(self.capacity.get());
        self.capacity.get().saturating_sub(available)
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity.get()
    }

    /// Fails all current and future waiters with `GateError::Closed`.
    ///
    /// Tokens already granted stay valid until released.
    pub fn close(&self) {
        self.semaphore.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Admission / GateToken
// ---------------------------------------------------------------------------

/// A granted admission: the token plus how long the caller queued for it.
#[derive(Debug)]
pub struct Admission {
    pub token: GateToken,
    pub waited: Duration,
}

/// One unit of gate capacity. The slot is returned when the token drops.
#[derive(Debug)]
pub struct GateToken {
    _permit: OwnedSemaphorePermit,
}

impl GateToken {
    /// Returns the slot to the gate.
    pub fn release(self) {
        drop(self);
    }
}

/// Why an admission was not granted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("gate admission abandoned after {waited:?}: {reason}")]
    Cancelled {
        reason: CancelReason,
        waited: Duration,
    },
    #[error("admission gate closed")]
    Closed,
}

impl GateError {
    /// How long the caller queued before giving up.
    #[must_use]
    pub fn waited(&self) -> Duration {
        match self {
            Self::Cancelled { waited, .. } => *waited,
            Self::Closed => Duration::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::{any, prop_assert, prop_assert_eq, proptest};
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn gate(capacity: u32) -> BoundedGate {
        BoundedGate::new(NonZeroU32::new(capacity).unwrap())
    }

    fn within(ms: u64) -> Deadline {
        Deadline::after(CancellationToken::new(), Duration::from_millis(ms))
    }

    #[tokio::test(start_paused = true)]
    async fn grants_immediately_when_free() {
        let gate = gate(2);
        let admission = gate.acquire(&within(100)).await.unwrap();
        assert_eq!(admission.waited, Duration::ZERO);
        assert_eq!(gate.occupancy(), 1);

        admission.token.release();
        assert_eq!(gate.occupancy(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn full_gate_cancels_at_deadline_without_changing_occupancy() {
        let gate = gate(1);
        let held = gate.acquire(&within(1000)).await.unwrap();

        let err = gate.acquire(&within(50)).await.unwrap_err();
        assert!(matches!(
            err,
            GateError::Cancelled {
                reason: CancelReason::DeadlineExceeded,
                ..
            }
        ));
        assert!(err.waited() >= Duration::from_millis(50));
        assert_eq!(gate.occupancy(), 1);
        drop(held);
        assert_eq!(gate.occupancy(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_waiter_is_admitted_on_release() {
        let gate = Arc::new(gate(1));
        let held = gate.acquire(&within(1000)).await.unwrap();

        let waiter = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.acquire(&within(1000)).await.map(|a| a.waited) }
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        held.token.release();

        let waited = waiter.await.unwrap().unwrap();
        assert!(waited >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn already_expired_deadline_is_rejected_up_front() {
        let gate = gate(1);
        let token = CancellationToken::new();
        token.cancel();
        let err = gate
            .acquire(&Deadline::from_signal(token))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GateError::Cancelled {
                reason: CancelReason::Caller,
                waited: Duration::ZERO,
            }
        );
        assert_eq!(gate.occupancy(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn close_fails_waiters_but_keeps_granted_tokens() {
        let gate = Arc::new(gate(1));
        let held = gate.acquire(&within(1000)).await.unwrap();

        let waiter = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.acquire(&within(1000)).await.map(|_| ()) }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        gate.close();
        assert_eq!(waiter.await.unwrap(), Err(GateError::Closed));
        assert!(gate.is_closed());
        assert_eq!(gate.occupancy(), 1);
        drop(held);
        assert_eq!(gate.occupancy(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn token_released_when_holding_task_is_aborted() {
        let gate = Arc::new(gate(1));
        let holder = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move {
                let _admission = gate.acquire(&within(5000)).await.unwrap();
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(gate.occupancy(), 1);

        holder.abort();
        let _ = holder.await;
        assert_eq!(gate.occupancy(), 0);
    }

    proptest! {
        #[test]
        fn occupancy_tracks_held_tokens(
            capacity in 1u32..5,
            ops in proptest::collection::vec((any::<bool>(), any::<usize>()), 1..40),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            rt.block_on(async {
                let gate = gate(capacity);
                let mut held: Vec<GateToken> = Vec::new();

                for (is_acquire, pick) in ops {
                    if is_acquire {
                        match gate.acquire(&within(5)).await {
                            Ok(admission) => held.push(admission.token),
                            Err(GateError::Cancelled { .. }) => {
                                prop_assert_eq!(held.len(), capacity as usize);
                            }
                            Err(GateError::Closed) => prop_assert!(false, "gate never closed"),
                        }
                    } else if !held.is_empty() {
                        let token = held.swap_remove(pick % held.len());
                        token.release();
                    }

                    prop_assert!(gate.occupancy() <= capacity);
                    prop_assert_eq!(gate.occupancy() as usize, held.len());
                }

                drop(held);
                prop_assert_eq!(gate.occupancy(), 0);
                Ok(())
            })?;
        }
    }
}
