//! Single-flight guard for wizard operations.
//!
//! Upload, submit, and resubmit are each allowed at most one in-flight
//! execution. A caller that fires while a previous run of the same
//! operation is still active is rejected immediately rather than queued.
//!
//! # Usage
//!
//! ```ignore
//! let guard = OpGuard::new("submit");
//!
//! // Take the slot (errors with OperationInFlight if already taken)
//! let permit = guard.try_begin()?;
//!
//! // Do the operation while holding the permit...
//!
//! // Slot is released when the permit is dropped
//! drop(permit);
//! ```

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// OpGuard
// ─────────────────────────────────────────────────────────────────────────────

/// Guard enforcing that a named operation has at most one in-flight run.
///
/// Backed by a one-permit semaphore. The permit releases itself on drop,
/// including when the operation future is cancelled or panics.
#[derive(Clone)]
pub struct OpGuard {
    /// Operation name used in the rejection error.
    name: &'static str,
    /// One-permit semaphore holding the single slot.
    sem: Arc<Semaphore>,
}

impl OpGuard {
    /// Creates a guard for the named operation.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            sem: Arc::new(Semaphore::new(1)),
        }
    }

    /// Claims the slot, or fails with [`AppError::OperationInFlight`] if a
    /// previous run still holds it. Never waits.
    pub fn try_begin(&self) -> Result<OpPermit, AppError> {
        self.sem
            .clone()
            .try_acquire_owned()
            .map(|permit| OpPermit { _permit: permit })
            .map_err(|_| AppError::OperationInFlight(self.name))
    }

    /// Returns true while a run of this operation holds the slot.
    pub fn in_flight(&self) -> bool {
        self.sem.available_permits() == 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpPermit
// ─────────────────────────────────────────────────────────────────────────────

/// Proof that the caller holds the operation slot.
///
/// The slot is released when this permit is dropped.
/// Do NOT implement Drop manually - OwnedSemaphorePermit handles release.
pub struct OpPermit {
    _permit: OwnedSemaphorePermit,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
