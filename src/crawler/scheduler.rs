//! Concurrency limiting and outstanding-work tracking
//!
//! This module handles:
//! - The pool of fetch slots, one per concurrent fetch
//! - Counting admitted jobs that have not finished yet, so the crawler can
//!   tell when it has gone idle

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Fixed-size pool of fetch slots
///
/// A job must hold a [`Slot`] while it fetches. Slots are handed out in the
/// order they were requested.
#[derive(Debug, Clone)]
pub struct SlotPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Outcome of waiting for a slot
#[derive(Debug)]
pub enum SlotAcquire {
    Acquired(Slot),
    /// The session was cancelled before a slot became free
    Cancelled,
}

/// Permission to run one fetch
#[derive(Debug)]
pub struct Slot {
    permit: OwnedSemaphorePermit,
}

impl Slot {
    /// Hands the slot back to the pool
    pub fn release(self) {
        drop(self.permit);
    }

    /// Gives the slot up for good, shrinking the pool
    ///
    /// Used once the session is cancelled: nothing may start afterwards.
    pub fn retire(self) {
        self.permit.forget();
    }

    /// Releases the slot, or retires it if `cancel` has fired
    pub fn finish(self, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            self.retire();
        } else {
            self.release();
        }
    }
}

impl SlotPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits for a free slot or for cancellation, whichever comes first
    ///
    /// Cancellation wins when both are ready.
    pub async fn acquire(&self, cancel: &CancellationToken) -> SlotAcquire {
        let semaphore = Arc::clone(&self.semaphore);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => SlotAcquire::Cancelled,
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => SlotAcquire::Acquired(Slot { permit }),
                // closed pool
                Err(_) => SlotAcquire::Cancelled,
            },
        }
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Closes the pool; pending and future acquisitions resolve to `Cancelled`
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// Counter of admitted jobs not yet finished
#[derive(Debug, Default)]
pub struct PendingWork {
    count: AtomicUsize,
    idle: Notify,
}

impl PendingWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one job; the count drops again when the unit is dropped
    pub fn start(self: &Arc<Self>) -> WorkUnit {
        self.count.fetch_add(1, Ordering::SeqCst);
        WorkUnit {
            pending: Arc::clone(self),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Resolves once no job is outstanding
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // register before checking, so a concurrent finish is not missed
            notified.as_mut().enable();

            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// One outstanding job, finished on drop
///
/// Dropping on every path (success, error, abandonment, panic) is what keeps
/// [`PendingWork::wait_idle`] from hanging.
#[derive(Debug)]
pub struct WorkUnit {
    pending: Arc<PendingWork>,
}

impl Drop for WorkUnit {
    fn drop(&mut self) {
        self.pending.finish();
    }
}
