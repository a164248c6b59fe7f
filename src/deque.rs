//! Blocking double-ended queue of idle members with FIFO waiter handoff

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::pooled::PooledObject;

/// Why a blocking take ended without a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TakeError {
    /// All waiters were cancelled (pool shutdown).
    Cancelled,
}

struct WaitSlot<T> {
    item: Option<Arc<PooledObject<T>>>,
    cancelled: bool,
}

/// One parked borrower. Inserts deliver a member directly into the slot of
/// the oldest waiter, so wakeups cannot be stolen by newer threads.
struct Waiter<T> {
    slot: Mutex<WaitSlot<T>>,
    cond: Condvar,
}

impl<T> Waiter<T> {
    fn new() -> Self {
        Waiter {
            slot: Mutex::new(WaitSlot {
                item: None,
                cancelled: false,
            }),
            cond: Condvar::new(),
        }
    }
}

struct DequeInner<T> {
    items: VecDeque<Arc<PooledObject<T>>>,
    waiters: VecDeque<Arc<Waiter<T>>>,
}

/// The idle pool. Capacity is not enforced here; the pool applies its
/// `maxIdle` policy before parking members.
///
/// Lock order: the deque lock is taken before any waiter slot lock.
pub struct IdleDeque<T> {
    inner: Mutex<DequeInner<T>>,
}

impl<T> IdleDeque<T> {
    pub(crate) fn new() -> Self {
        IdleDeque {
            inner: Mutex::new(DequeInner {
                items: VecDeque::new(),
                waiters: VecDeque::new(),
            }),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Pop the head without blocking.
    pub(crate) fn poll_first(&self) -> Option<Arc<PooledObject<T>>> {
        self.inner.lock().items.pop_front()
    }

    /// Pop the tail without blocking.
    pub(crate) fn poll_last(&self) -> Option<Arc<PooledObject<T>>> {
        self.inner.lock().items.pop_back()
    }

    /// Insert at the head, preferring direct handoff to the oldest waiter.
    pub(crate) fn add_first(&self, member: Arc<PooledObject<T>>) {
        let mut q = self.inner.lock();
        if let Some(member) = Self::hand_off(&mut q, member) {
            q.items.push_front(member);
        }
    }

    /// Insert at the tail, preferring direct handoff to the oldest waiter.
    pub(crate) fn add_last(&self, member: Arc<PooledObject<T>>) {
        let mut q = self.inner.lock();
        if let Some(member) = Self::hand_off(&mut q, member) {
            q.items.push_back(member);
        }
    }

    /// Deliver to the oldest live waiter; gives the member back when nobody
    /// is waiting.
    fn hand_off(
        q: &mut DequeInner<T>,
        member: Arc<PooledObject<T>>,
    ) -> Option<Arc<PooledObject<T>>> {
        while let Some(waiter) = q.waiters.pop_front() {
            let mut slot = waiter.slot.lock();
            if slot.cancelled {
                continue;
            }
            slot.item = Some(member);
            waiter.cond.notify_one();
            return None;
        }
        Some(member)
    }

    /// Block until a member is available.
    pub(crate) fn take_first(&self) -> Result<Arc<PooledObject<T>>, TakeError> {
        let waiter = {
            let mut q = self.inner.lock();
            if let Some(member) = q.items.pop_front() {
                return Ok(member);
            }
            let waiter = Arc::new(Waiter::new());
            q.waiters.push_back(Arc::clone(&waiter));
            waiter
        };

        let mut slot = waiter.slot.lock();
        loop {
            if let Some(member) = slot.item.take() {
                return Ok(member);
            }
            if slot.cancelled {
                return Err(TakeError::Cancelled);
            }
            waiter.cond.wait(&mut slot);
        }
    }

    /// Block up to `timeout` for a member. `Ok(None)` on timeout.
    pub(crate) fn poll_first_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<Arc<PooledObject<T>>>, TakeError> {
        let deadline = Instant::now() + timeout;
        let waiter = {
            let mut q = self.inner.lock();
            if let Some(member) = q.items.pop_front() {
                return Ok(Some(member));
            }
            let waiter = Arc::new(Waiter::new());
            q.waiters.push_back(Arc::clone(&waiter));
            waiter
        };

        {
            let mut slot = waiter.slot.lock();
            loop {
                if let Some(member) = slot.item.take() {
                    return Ok(Some(member));
                }
                if slot.cancelled {
                    return Err(TakeError::Cancelled);
                }
                if waiter.cond.wait_until(&mut slot, deadline).timed_out() {
                    break;
                }
            }
        }

        // Timed out: unregister, then drain a member delivered in the race
        // between the timeout and the unregistration.
        {
            let mut q = self.inner.lock();
            q.waiters.retain(|w| !Arc::ptr_eq(w, &waiter));
        }
        let mut slot = waiter.slot.lock();
        Ok(slot.item.take())
    }

    /// Remove a specific member. Used by destruction paths.
    pub(crate) fn remove(&self, member: &Arc<PooledObject<T>>) -> bool {
        let mut q = self.inner.lock();
        if let Some(pos) = q.items.iter().position(|m| Arc::ptr_eq(m, member)) {
            q.items.remove(pos);
            true
        } else {
            false
        }
    }

    /// Point-in-time copy, head first. Entries may leave the deque after the
    /// snapshot is taken; callers tolerate that through the member state
    /// machine.
    pub(crate) fn snapshot(&self) -> Vec<Arc<PooledObject<T>>> {
        self.inner.lock().items.iter().cloned().collect()
    }

    /// Wake every parked borrower with a cancellation.
    pub(crate) fn cancel_waiters(&self) {
        let drained: Vec<_> = {
            let mut q = self.inner.lock();
            q.waiters.drain(..).collect()
        };
        for waiter in drained {
            let mut slot = waiter.slot.lock();
            slot.cancelled = true;
            waiter.cond.notify_one();
        }
    }
}
