//! The monitored lock, as seen from the probe
//!
//! The monitor never owns the lock it measures. A host runtime exposes its
//! global execution lock through [`HostLock`]; the probe only ever acquires it
//! and immediately releases it.
//!
//! [`ExecutionLock`] is a reference implementation of a global execution lock
//! (one owner at a time, reentrant for the owning thread). Embedders without a
//! lock of their own, tests and benchmarks use it to drive the monitor.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Host primitives the probe needs
///
/// `acquire` may block for as long as other threads hold the lock.
/// `release` is fast and never fails after a successful acquire.
pub trait HostLock: Send + Sync {
    fn acquire(&self);

    fn release(&self);

    /// Acquire, giving up after `timeout`
    ///
    /// Returns `false` if the lock was not acquired in time. The default
    /// cannot bound the host call and simply blocks; hung probes on such hosts
    /// are caught by the watchdog instead.
    fn try_acquire_for(&self, _timeout: Duration) -> bool {
        self.acquire();
        true
    }
}

impl<L: HostLock + ?Sized> HostLock for Arc<L> {
    fn acquire(&self) {
        (**self).acquire()
    }

    fn release(&self) {
        (**self).release()
    }

    fn try_acquire_for(&self, timeout: Duration) -> bool {
        (**self).try_acquire_for(timeout)
    }
}

impl<L: HostLock + ?Sized> HostLock for &L {
    fn acquire(&self) {
        (**self).acquire()
    }

    fn release(&self) {
        (**self).release()
    }

    fn try_acquire_for(&self, timeout: Duration) -> bool {
        (**self).try_acquire_for(timeout)
    }
}

/// Adapter turning a pair of host callbacks into a [`HostLock`]
///
/// ```
/// use lockknock::host::{FnLock, HostLock};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let knocks = Arc::new(AtomicUsize::new(0));
/// let counter = knocks.clone();
/// let lock = FnLock::new(move || { counter.fetch_add(1, Ordering::Relaxed); }, || {});
/// lock.acquire();
/// lock.release();
/// assert_eq!(knocks.load(Ordering::Relaxed), 1);
/// ```
pub struct FnLock<A, R> {
    acquire: A,
    release: R,
}

impl<A, R> FnLock<A, R>
where
    A: Fn() + Send + Sync,
    R: Fn() + Send + Sync,
{
    pub fn new(acquire: A, release: R) -> Self {
        Self { acquire, release }
    }
}

impl<A, R> HostLock for FnLock<A, R>
where
    A: Fn() + Send + Sync,
    R: Fn() + Send + Sync,
{
    fn acquire(&self) {
        (self.acquire)()
    }

    fn release(&self) {
        (self.release)()
    }
}

#[derive(Debug)]
struct LockState {
    /// Thread currently executing under the lock
    owner: Option<ThreadId>,
    /// Nested acquisitions by the owner
    recursion_count: usize,
    /// Tickets of blocked threads, in arrival order
    waiters: VecDeque<u64>,
    next_ticket: u64,
}

impl LockState {
    fn reenter(&mut self, me: ThreadId) -> bool {
        if self.owner == Some(me) {
            self.recursion_count += 1;
            true
        } else {
            false
        }
    }

    fn is_turn(&self, ticket: u64) -> bool {
        self.owner.is_none() && self.waiters.front() == Some(&ticket)
    }

    fn take(&mut self, me: ThreadId) {
        self.waiters.pop_front();
        self.owner = Some(me);
        self.recursion_count = 1;
    }

    fn enqueue(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.waiters.push_back(ticket);
        ticket
    }
}

/// Reference global execution lock
///
/// Only one thread holds the lock at a time and ownership is handed to
/// blocked threads in arrival order, so a thread that releases and
/// immediately re-enters queues behind everyone already waiting. The owning
/// thread may re-enter; each `enter` must be paired with an `exit`.
#[derive(Debug)]
pub struct ExecutionLock {
    state: Mutex<LockState>,
    condvar: Condvar,
}

impl Default for ExecutionLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                owner: None,
                recursion_count: 0,
                waiters: VecDeque::new(),
                next_ticket: 0,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Try to take the lock without waiting
    ///
    /// Fails if another thread holds the lock or is queued for it.
    pub fn try_enter(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.reenter(me) {
            return true;
        }
        if state.owner.is_none() && state.waiters.is_empty() {
            state.owner = Some(me);
            state.recursion_count = 1;
            return true;
        }
        false
    }

    /// Block until the lock is held by the calling thread
    pub fn enter(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.reenter(me) {
            return;
        }

        let ticket = state.enqueue();
        while !state.is_turn(ticket) {
            self.condvar.wait(&mut state);
        }
        state.take(me);
    }

    /// Block for at most `timeout`; returns whether the lock was taken
    ///
    /// A timeout too large to express as a deadline waits like [`enter`].
    ///
    /// [`enter`]: ExecutionLock::enter
    pub fn enter_for(&self, timeout: Duration) -> bool {
        if timeout.is_zero() {
            return self.try_enter();
        }
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.enter();
            return true;
        };

        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.reenter(me) {
            return true;
        }

        let ticket = state.enqueue();
        while !state.is_turn(ticket) {
            if self.condvar.wait_until(&mut state, deadline).timed_out() && !state.is_turn(ticket) {
                state.waiters.retain(|&t| t != ticket);
                // The next waiter may now be at the front
                self.condvar.notify_all();
                return false;
            }
        }
        state.take(me);
        true
    }

    /// Release one level of ownership
    ///
    /// Returns `false` if the calling thread does not hold the lock.
    pub fn exit(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.owner != Some(me) || state.recursion_count == 0 {
            return false;
        }

        state.recursion_count -= 1;
        if state.recursion_count == 0 {
            state.owner = None;
            self.condvar.notify_all();
        }

        true
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Threads currently blocked waiting for the lock
    pub fn queue_len(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Hold the lock until the returned guard is dropped
    pub fn hold(&self) -> ExecutionGuard<'_> {
        self.enter();
        ExecutionGuard { lock: self }
    }
}

impl HostLock for ExecutionLock {
    fn acquire(&self) {
        self.enter();
    }

    fn release(&self) {
        if !self.exit() {
            tracing::warn!("release() called by a thread that does not hold the execution lock");
        }
    }

    fn try_acquire_for(&self, timeout: Duration) -> bool {
        self.enter_for(timeout)
    }
}

/// RAII ownership of an [`ExecutionLock`]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ExecutionGuard<'a> {
    lock: &'a ExecutionLock,
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.lock.exit();
    }
}
