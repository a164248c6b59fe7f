//! Per-member wrapper: lifecycle state machine and timestamps

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::atomic::AtomicCell;

use crate::deque::IdleDeque;

/// Lifecycle state of a pooled member.
///
/// Transitions are compare-and-set; there is no per-member lock. `Invalid`
/// is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PooledState {
    /// Parked in the idle pool, available for borrow.
    Idle,
    /// Checked out to a borrower.
    Allocated,
    /// Under examination by the evictor.
    Eviction,
    /// A borrower raced the evictor; the evictor must put the member back at
    /// the head of the idle pool instead of testing it.
    EvictionReturnToHead,
    /// Destroyed, or in the process of being destroyed.
    Invalid,
}

/// One pooled instance plus its metadata.
pub struct PooledObject<T> {
    object: T,
    state: AtomicCell<PooledState>,
    create_time: Instant,
    last_borrow_time: AtomicCell<Instant>,
    last_return_time: AtomicCell<Instant>,
}

impl<T> PooledObject<T> {
    pub(crate) fn new(object: T) -> Self {
        let now = Instant::now();
        PooledObject {
            object,
            state: AtomicCell::new(PooledState::Idle),
            create_time: now,
            last_borrow_time: AtomicCell::new(now),
            last_return_time: AtomicCell::new(now),
        }
    }

    /// The wrapped value.
    pub fn object(&self) -> &T {
        &self.object
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PooledState {
        self.state.load()
    }

    /// When the member was created.
    pub fn create_time(&self) -> Instant {
        self.create_time
    }

    /// How long the member has sat idle since its last return. Zero while
    /// checked out or destroyed. The eviction states report idle time so the
    /// evictor can age out the member it is examining.
    pub fn idle_time(&self) -> Duration {
        match self.state.load() {
            PooledState::Idle | PooledState::Eviction | PooledState::EvictionReturnToHead => {
                self.last_return_time.load().elapsed()
            }
            _ => Duration::ZERO,
        }
    }

    /// Claim the member for a borrower. Returns true iff the transition from
    /// `Idle` was won. A member under eviction test is flagged for return to
    /// the head of the idle pool and the claim fails.
    pub fn allocate(&self) -> bool {
        loop {
            match self.state.load() {
                PooledState::Idle => {
                    if self
                        .state
                        .compare_exchange(PooledState::Idle, PooledState::Allocated)
                        .is_ok()
                    {
                        self.last_borrow_time.store(Instant::now());
                        return true;
                    }
                }
                PooledState::Eviction => {
                    if self
                        .state
                        .compare_exchange(PooledState::Eviction, PooledState::EvictionReturnToHead)
                        .is_ok()
                    {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }

    /// Release the member back to the idle state, recording the return time.
    /// Returns false when the member was not allocated (double return).
    pub fn deallocate(&self) -> bool {
        if self
            .state
            .compare_exchange(PooledState::Allocated, PooledState::Idle)
            .is_ok()
        {
            self.last_return_time.store(Instant::now());
            true
        } else {
            false
        }
    }

    /// Begin an eviction test. Succeeds only from `Idle`.
    pub fn start_eviction_test(&self) -> bool {
        self.state
            .compare_exchange(PooledState::Idle, PooledState::Eviction)
            .is_ok()
    }

    /// Finish an eviction test. Returns the member to `Idle`, or re-inserts
    /// it at the head of `idle` when a borrower raced in during the test.
    /// Returns true iff the member went straight back to `Idle`.
    pub fn end_eviction_test(member: &Arc<Self>, idle: &IdleDeque<T>) -> bool {
        if member
            .state
            .compare_exchange(PooledState::Eviction, PooledState::Idle)
            .is_ok()
        {
            return true;
        }
        if member
            .state
            .compare_exchange(PooledState::EvictionReturnToHead, PooledState::Idle)
            .is_ok()
        {
            idle.add_first(Arc::clone(member));
        }
        false
    }

    /// Mark the member destroyed. Returns true iff this call performed the
    /// transition, so destruction runs exactly once under races.
    pub fn invalidate(&self) -> bool {
        self.state.swap(PooledState::Invalid) != PooledState::Invalid
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for PooledObject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledObject")
            .field("object", &self.object)
            .field("state", &self.state.load())
            .field("idle_time", &self.idle_time())
            .finish()
    }
}
