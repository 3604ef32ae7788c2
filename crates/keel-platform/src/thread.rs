//! Thread creation and control.
//!
//! Spawn takes a start routine, an initial-suspended flag, a priority
//! hint, and an optional name, and yields a handle plus the OS thread
//! id. Suspension is an integer-counted gate: the thread runs only while
//! the count is zero, and the count is honored at controlled points,
//! namely thread startup and any [`ThreadToken::suspend_point`] the
//! routine chooses to call. (Preemptive suspension of a running thread
//! does not exist on POSIX; the gate is the portable rendition.)

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{PlatformError, Result};
use crate::os;
use crate::sync::{Event, Timeout, WaitOutcome};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Spawn-time settings.
#[derive(Debug, Clone, Default)]
pub struct ThreadOptions {
    /// Name applied to the OS thread (truncated to the kernel limit).
    pub name: Option<String>,
    /// Priority hint, 0 (lowest) to 99 (highest). Best-effort: the OS
    /// may refuse elevation.
    pub priority: Option<u32>,
    /// Start with a suspend count of one; the routine runs only after
    /// [`ThreadHandle::resume`].
    pub start_suspended: bool,
}

// ---------------------------------------------------------------------------
// Shared state and token
// ---------------------------------------------------------------------------

struct ThreadShared {
    gate: Mutex<u32>, // suspend depth
    gate_cond: Condvar,
    os_id: Mutex<Option<u64>>,
    os_id_cond: Condvar,
    exit_code: Mutex<Option<u32>>,
    done: Event,
}

/// Handed to the start routine; lets it cooperate with suspension.
pub struct ThreadToken {
    shared: Arc<ThreadShared>,
}

impl ThreadToken {
    /// Blocks while the thread's suspend count is above zero.
    pub fn suspend_point(&self) {
        let mut depth = self.shared.gate.lock();
        while *depth > 0 {
            self.shared.gate_cond.wait(&mut depth);
        }
    }

    /// True if a suspend is pending; lets long loops poll cheaply
    /// before paying for a `suspend_point`.
    pub fn suspend_requested(&self) -> bool {
        *self.shared.gate.lock() > 0
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Owning handle to a spawned thread.
///
/// Dropping the handle detaches the thread; `join` consumes it. Exactly
/// one release happens either way.
pub struct ThreadHandle {
    join: Option<std::thread::JoinHandle<u32>>,
    shared: Arc<ThreadShared>,
    os_id: u64,
}

impl ThreadHandle {
    /// The OS identifier of the thread.
    pub fn os_id(&self) -> u64 {
        self.os_id
    }

    /// Increments the suspend depth. Takes effect when the thread next
    /// reaches a suspend point.
    pub fn suspend(&self) {
        *self.shared.gate.lock() += 1;
    }

    /// Decrements the suspend depth; at zero the thread may run.
    pub fn resume(&self) {
        let mut depth = self.shared.gate.lock();
        if *depth > 0 {
            *depth -= 1;
            if *depth == 0 {
                self.shared.gate_cond.notify_all();
            }
        }
    }

    /// Current suspend depth.
    pub fn suspend_depth(&self) -> u32 {
        *self.shared.gate.lock()
    }

    /// Whether the routine has not yet returned.
    pub fn is_alive(&self) -> bool {
        !self.shared.done.is_signaled()
    }

    /// Waits for completion with a timeout; the thread keeps running on
    /// `TimedOut`.
    pub fn wait(&self, timeout: Timeout) -> WaitOutcome {
        self.shared.done.wait(timeout)
    }

    /// Exit code, once the routine has returned.
    pub fn exit_code(&self) -> Option<u32> {
        *self.shared.exit_code.lock()
    }

    /// Blocks until the routine returns and yields its exit code.
    pub fn join(mut self) -> Result<u32> {
        let handle = self
            .join
            .take()
            .ok_or(PlatformError::Invalid("thread already joined"))?;
        handle
            .join()
            .map_err(|_| PlatformError::Invalid("thread panicked"))
    }

    /// Pins the thread to the CPUs in `mask`; returns the previous mask.
    /// Reports `Unsupported` where the backend cannot pin threads.
    pub fn set_affinity(&self, mask: u64) -> Result<u64> {
        Ok(os::set_affinity(self.os_id, mask)?)
    }

    /// CPU set the thread may currently run on.
    pub fn affinity(&self) -> Result<u64> {
        Ok(os::get_affinity(self.os_id)?)
    }
}

// ---------------------------------------------------------------------------
// Spawn and free functions
// ---------------------------------------------------------------------------

/// Spawns a thread running `routine`, which receives a [`ThreadToken`]
/// and returns an exit code. Returns the handle and the OS thread id.
pub fn spawn<F>(options: ThreadOptions, routine: F) -> Result<(ThreadHandle, u64)>
where
    F: FnOnce(&ThreadToken) -> u32 + Send + 'static,
{
    let shared = Arc::new(ThreadShared {
        gate: Mutex::new(u32::from(options.start_suspended)),
        gate_cond: Condvar::new(),
        os_id: Mutex::new(None),
        os_id_cond: Condvar::new(),
        exit_code: Mutex::new(None),
        done: Event::new(true, false),
    });

    let mut builder = std::thread::Builder::new();
    if let Some(name) = &options.name {
        builder = builder.name(name.clone());
    }

    let worker_shared = Arc::clone(&shared);
    let name = options.name.clone();
    let priority = options.priority;
    let join = builder
        .spawn(move || {
            // Publish identity before honoring the suspend gate, so the
            // spawner can return even for suspended threads.
            let id = os::current_thread_id();
            *worker_shared.os_id.lock() = Some(id);
            worker_shared.os_id_cond.notify_all();

            if let Some(name) = &name {
                let _ = os::set_current_thread_name(name);
            }
            if let Some(priority) = priority {
                let _ = os::set_current_thread_priority(priority);
            }

            let token = ThreadToken {
                shared: Arc::clone(&worker_shared),
            };
            token.suspend_point();
            let code = routine(&token);

            *worker_shared.exit_code.lock() = Some(code);
            worker_shared.done.set();
            code
        })
        .map_err(PlatformError::from)?;

    let os_id = {
        let mut id = shared.os_id.lock();
        while id.is_none() {
            shared.os_id_cond.wait(&mut id);
        }
        id.unwrap()
    };

    Ok((
        ThreadHandle {
            join: Some(join),
            shared,
            os_id,
        },
        os_id,
    ))
}

/// OS identifier of the calling thread.
pub fn current_thread_id() -> u64 {
    os::current_thread_id()
}

/// Suspends the calling thread for at least `milliseconds`.
pub fn sleep(milliseconds: u32) {
    std::thread::sleep(Duration::from_millis(u64::from(milliseconds)));
}

/// Names the calling thread in the OS.
pub fn set_current_thread_name(name: &str) -> Result<()> {
    Ok(os::set_current_thread_name(name)?)
}

/// Wide variant of [`set_current_thread_name`]; identical over ASCII.
pub fn set_current_thread_name_wide(name: &[u16]) -> Result<()> {
    set_current_thread_name(&keel_core::text::wide_to_string(name))
}

/// CPU time consumed by the calling thread, in milliseconds.
pub fn current_thread_cpu_time_millis() -> Result<u64> {
    Ok(os::thread_cpu_time_millis()?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn spawn_reports_exit_code_and_id() {
        let (handle, id) = spawn(ThreadOptions::default(), |_| 7).unwrap();
        assert_ne!(id, 0);
        assert_eq!(handle.join().unwrap(), 7);
    }

    #[test]
    fn suspended_thread_runs_only_after_resume() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_inner = Arc::clone(&ran);
        let options = ThreadOptions {
            start_suspended: true,
            ..Default::default()
        };
        let (handle, _) = spawn(options, move |_| {
            ran_inner.store(true, Ordering::SeqCst);
            0
        })
        .unwrap();

        sleep(100);
        assert!(!ran.load(Ordering::SeqCst));
        assert!(handle.is_alive());
        assert_eq!(handle.suspend_depth(), 1);

        handle.resume();
        assert_eq!(handle.join().unwrap(), 0);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn suspend_depth_is_counted() {
        let options = ThreadOptions {
            start_suspended: true,
            ..Default::default()
        };
        let (handle, _) = spawn(options, |_| 0).unwrap();
        handle.suspend();
        assert_eq!(handle.suspend_depth(), 2);
        handle.resume();
        assert!(handle.is_alive());
        handle.resume(); // depth reaches zero, thread runs
        assert_eq!(handle.join().unwrap(), 0);
    }

    #[test]
    fn wait_times_out_while_running() {
        let (handle, _) = spawn(ThreadOptions::default(), |_| {
            sleep(300);
            9
        })
        .unwrap();
        assert_eq!(handle.wait(Timeout::Millis(10)), WaitOutcome::TimedOut);
        assert_eq!(handle.wait(Timeout::Infinite), WaitOutcome::Signaled);
        assert_eq!(handle.exit_code(), Some(9));
        assert!(!handle.is_alive());
        assert_eq!(handle.join().unwrap(), 9);
    }

    #[test]
    fn routine_can_pause_at_suspend_points() {
        let (handle, _) = spawn(ThreadOptions::default(), |token| {
            for _ in 0..100 {
                token.suspend_point();
            }
            1
        })
        .unwrap();
        handle.suspend();
        handle.resume();
        assert_eq!(handle.join().unwrap(), 1);
    }

    #[test]
    fn named_spawn_succeeds() {
        let options = ThreadOptions {
            name: Some(String::from("keel-worker")),
            priority: Some(40),
            ..Default::default()
        };
        let (handle, _) = spawn(options, |_| 0).unwrap();
        assert_eq!(handle.join().unwrap(), 0);
    }
}
