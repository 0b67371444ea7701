// src/sync/oneshot.rs
//! One-shot event with a payload
//!
//! Raised at most once, waited on by any number of threads. The payload is
//! published with release ordering and observed with acquire ordering, so a
//! waiter that sees the event also sees everything the raiser wrote before
//! raising it.
//!
//! Waiters are taken off the ready queue with [`Scheduler::block_current`]
//! and put back by the raise, so a waiting parent costs no CPU time and
//! cannot starve a lower-priority child.

use alloc::vec::Vec;

use spin::{Mutex, Once};

use crate::kernel::core::{Scheduler, ThreadId};

/// Event that is raised exactly once and carries a value
pub struct OneShot<T> {
    slot: Once<T>,
    waiters: Mutex<Vec<ThreadId>>,
}

impl<T> OneShot<T> {
    /// Create an unraised event
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: Once::new(),
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Raise the event with `value` and wake every blocked waiter.
    ///
    /// Returns `false` (dropping `value`) if it was already raised.
    pub fn raise(&self, value: T, scheduler: &dyn Scheduler) -> bool {
        let mut first = false;
        self.slot.call_once(|| {
            first = true;
            value
        });
        if first {
            let waiters = core::mem::take(&mut *self.waiters.lock());
            for tid in waiters {
                scheduler.unblock(tid);
            }
        }
        first
    }

    /// Payload if the event has been raised
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.slot.get()
    }

    /// Whether the event has been raised
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.slot.is_completed()
    }

    /// Block the calling thread `tid` until the event is raised.
    pub fn wait(&self, scheduler: &dyn Scheduler, tid: ThreadId) -> &T {
        loop {
            if let Some(value) = self.slot.get() {
                return value;
            }
            {
                let mut waiters = self.waiters.lock();
                if !waiters.contains(&tid) {
                    waiters.push(tid);
                }
            }
            // A raise that ran before the registration did not see us.
            if let Some(value) = self.slot.get() {
                self.waiters.lock().retain(|&w| w != tid);
                return value;
            }
            scheduler.block_current(tid);
        }
    }

    /// Number of threads registered as blocked on the event
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl<T> Default for OneShot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for OneShot<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.slot.get() {
            Some(value) => f.debug_tuple("OneShot").field(value).finish(),
            None => write!(f, "OneShot(<pending>, {} waiting)", self.waiter_count()),
        }
    }
}
