//! Admission control for connection handlers.
//!
//! The [`ConcurrencyLimiter`] bounds how many connections are processed at the
//! same time. A new connection is either admitted right away, queued until a
//! slot frees up, or rejected when the queue is full as well:
//!
//! ```text
//!   admit()
//!     |
//!     +-- free slot ----------------------------> Ready(Permit)
//!     |
//!     +-- free queue place ---------------------> Queued  --acquire()--> Permit
//!     |
//!     +-- otherwise ----------------------------> Rejected
//! ```
//!
//! Slots and queue places are both `tokio::sync::Semaphore` permits. Waiters
//! are served in FIFO order and a slot is released when its [`Permit`] is
//! dropped, so the number of active handlers never exceeds the bound.

use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Bounds the number of concurrently active connection handlers.
///
/// Cloning is cheap, clones share the same slots.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    slots: Arc<Semaphore>,
    queue: Arc<Semaphore>,
    max_active: usize,
    max_queued: usize,
}

/// Outcome of [`ConcurrencyLimiter::admit`].
#[derive(Debug)]
pub enum Admission {
    /// A slot was free
    Ready(Permit),
    /// Every slot is taken, the connection waits for one
    Queued(Queued),
    /// Slots and queue are full, the connection must be closed
    Rejected,
}

impl ConcurrencyLimiter {
    /// Creates a limiter allowing `max_active` handlers and `max_queued` waiting connections.
    pub fn new(max_active: usize, max_queued: usize) -> Self {
        let max_active = max_active.min(Semaphore::MAX_PERMITS);
        let max_queued = max_queued.min(Semaphore::MAX_PERMITS);
        Self {
            slots: Arc::new(Semaphore::new(max_active)),
            queue: Arc::new(Semaphore::new(max_queued)),
            max_active,
            max_queued,
        }
    }

    /// Decides whether a new connection may start.
    pub fn admit(&self) -> Admission {
        if let Ok(slot) = Arc::clone(&self.slots).try_acquire_owned() {
            trace!(active = self.active(), "connection admitted");
            return Admission::Ready(Permit { _slot: slot });
        }

        if let Ok(place) = Arc::clone(&self.queue).try_acquire_owned() {
            trace!(queued = self.queued(), "connection queued");
            return Admission::Queued(Queued { slots: Arc::clone(&self.slots), _place: place });
        }

        Admission::Rejected
    }

    /// Number of slots currently held.
    pub fn active(&self) -> usize {
        self.max_active - self.slots.available_permits()
    }

    /// Number of connections waiting for a slot.
    pub fn queued(&self) -> usize {
        self.max_queued - self.queue.available_permits()
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    pub fn max_queued(&self) -> usize {
        self.max_queued
    }
}

/// A held slot, released on drop.
#[derive(Debug)]
pub struct Permit {
    _slot: OwnedSemaphorePermit,
}

/// A connection waiting for a slot.
///
/// It keeps its place in the queue until [`Queued::acquire`] completes or it
/// is dropped.
#[derive(Debug)]
pub struct Queued {
    slots: Arc<Semaphore>,
    _place: OwnedSemaphorePermit,
}

impl Queued {
    /// Waits for a free slot, oldest waiter first.
    ///
    /// Cancel safe: dropping the future gives up the place in the queue and
    /// passes a slot already assigned to it on to the next waiter.
    pub async fn acquire(self) -> Result<Permit, AcquireError> {
        let slot = self.slots.acquire_owned().await?;
        Ok(Permit { _slot: slot })
    }
}
