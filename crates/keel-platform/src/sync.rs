//! Synchronization primitives: critical sections, events, timed waits.
//!
//! Blocking calls suspend only the calling thread. Signaling an
//! auto-reset event releases exactly one current waiter; a manual-reset
//! event releases all of them. No fairness beyond what the OS condition
//! variable provides.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, ReentrantMutex, ReentrantMutexGuard};

// ---------------------------------------------------------------------------
// Timeout and wait outcome
// ---------------------------------------------------------------------------

/// Wait bound: `Millis(0)` polls, `Infinite` blocks forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Infinite,
    Millis(u32),
}

impl Timeout {
    /// Millisecond sentinel for an unbounded wait.
    pub const INFINITE_MILLIS: u32 = u32::MAX;

    /// Interprets the classic millisecond encoding, where `u32::MAX`
    /// means "wait forever".
    pub fn from_millis(millis: u32) -> Self {
        if millis == Self::INFINITE_MILLIS {
            Timeout::Infinite
        } else {
            Timeout::Millis(millis)
        }
    }
}

/// Tri-state result of a blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
    Failed,
}

// ---------------------------------------------------------------------------
// Critical section
// ---------------------------------------------------------------------------

/// Reentrant, single-process mutual exclusion.
///
/// The owning thread may re-enter without deadlock; the guard releases
/// one level of ownership on drop, so every exit path unwinds correctly.
#[derive(Default)]
pub struct CriticalSection {
    inner: ReentrantMutex<()>,
}

pub struct CriticalSectionGuard<'a> {
    _guard: ReentrantMutexGuard<'a, ()>,
}

impl CriticalSection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until this thread owns the section.
    pub fn enter(&self) -> CriticalSectionGuard<'_> {
        CriticalSectionGuard {
            _guard: self.inner.lock(),
        }
    }

    /// Non-blocking attempt; `None` when another thread owns the section.
    pub fn try_enter(&self) -> Option<CriticalSectionGuard<'_>> {
        self.inner
            .try_lock()
            .map(|guard| CriticalSectionGuard { _guard: guard })
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

struct EventInner {
    manual_reset: bool,
    signaled: Mutex<bool>,
    cond: Condvar,
}

/// Signaling primitive in manual-reset and auto-reset flavors.
///
/// Cloning yields another handle to the same underlying event (waiters
/// through any clone observe the same state); the OS object goes away
/// when the last clone drops.
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Event {
    pub fn new(manual_reset: bool, initially_signaled: bool) -> Self {
        Self {
            inner: Arc::new(EventInner {
                manual_reset,
                signaled: Mutex::new(initially_signaled),
                cond: Condvar::new(),
            }),
        }
    }

    /// Moves the event to the signaled state. Idempotent for
    /// manual-reset events; for auto-reset events at most one waiter is
    /// released per call.
    pub fn set(&self) {
        let mut signaled = self.inner.signaled.lock();
        *signaled = true;
        if self.inner.manual_reset {
            self.inner.cond.notify_all();
        } else {
            self.inner.cond.notify_one();
        }
    }

    /// Moves the event to the non-signaled state.
    pub fn reset(&self) {
        *self.inner.signaled.lock() = false;
    }

    /// Blocks until signaled or the timeout elapses.
    pub fn wait(&self, timeout: Timeout) -> WaitOutcome {
        let deadline = match timeout {
            Timeout::Infinite => None,
            Timeout::Millis(ms) => Some(Instant::now() + Duration::from_millis(u64::from(ms))),
        };
        let mut signaled = self.inner.signaled.lock();
        loop {
            if *signaled {
                // Auto-reset consumes the signal for exactly one waiter.
                if !self.inner.manual_reset {
                    *signaled = false;
                }
                return WaitOutcome::Signaled;
            }
            match deadline {
                None => self.inner.cond.wait(&mut signaled),
                Some(deadline) => {
                    if self.inner.cond.wait_until(&mut signaled, deadline).timed_out() {
                        // Re-check: the signal may have raced the timeout.
                        if *signaled {
                            if !self.inner.manual_reset {
                                *signaled = false;
                            }
                            return WaitOutcome::Signaled;
                        }
                        return WaitOutcome::TimedOut;
                    }
                }
            }
        }
    }

    /// Snapshot of the signaled state; may be stale immediately.
    pub fn is_signaled(&self) -> bool {
        *self.inner.signaled.lock()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
