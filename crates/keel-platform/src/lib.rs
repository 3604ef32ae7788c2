//! # keel-platform
//!
//! The lowest layer of the engine: one portable surface over OS
//! threads, synchronization, processes, files, directories, memory
//! maps, named pipes, sockets, clocks, and console I/O, together with
//! the locale-free formatting and conversion core re-exported from
//! `keel-core`.
//!
//! Exactly one backend (under `os/`) is compiled in per target; nothing
//! above this crate calls an OS primitive directly.
//!
//! Process-wide state (performance/CPU/OS snapshots, the debug heap
//! registry) lives in an owned [`Platform`] context constructed at
//! process start and torn down at exit, not in ambient statics.

mod error;
mod os;

pub mod console;
pub mod debug;
pub mod fs;
pub mod heap;
pub mod info;
pub mod mmap;
pub mod net;
pub mod pipe;
pub mod process;
pub mod sync;
pub mod thread;
pub mod time;

pub use error::{PlatformError, Result, last_error};
pub use info::{CpuData, OsData, PerformanceData};

// The pure-logic core is part of this facade's surface.
pub use keel_core::{calendar, convert, fmt, fmt_args, text};

use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Endianness
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

pub const fn endian() -> Endian {
    if cfg!(target_endian = "little") {
        Endian::Little
    } else {
        Endian::Big
    }
}

pub const fn is_little_endian() -> bool {
    matches!(endian(), Endian::Little)
}

pub const fn is_big_endian() -> bool {
    matches!(endian(), Endian::Big)
}

// ---------------------------------------------------------------------------
// Platform context
// ---------------------------------------------------------------------------

/// Init-time settings for the platform context.
#[derive(Debug, Clone)]
pub struct PlatformOptions {
    /// Emit a debug-heap leak report through the debug output channel
    /// when the context is torn down.
    pub report_leaks_on_teardown: bool,
}

impl Default for PlatformOptions {
    fn default() -> Self {
        Self {
            report_leaks_on_teardown: true,
        }
    }
}

/// Owned process-wide platform context.
///
/// Construct once at process start; teardown happens on drop. All
/// contained state is internally guarded, so concurrent access needs no
/// external locking, but every value handed out is a snapshot.
pub struct Platform {
    options: PlatformOptions,
    main_thread_id: u64,
    heap: heap::DebugHeap,
    cpu: CpuData,
    os_data: OsData,
    performance: Mutex<PerformanceData>,
    cpu_sampler: Mutex<info::CpuUsageSampler>,
}

impl Platform {
    /// Initializes the platform context on the calling thread, which
    /// becomes the main thread.
    pub fn init(options: PlatformOptions) -> Result<Platform> {
        let cpu = info::collect_cpu_data();
        let sampler = info::CpuUsageSampler::new(cpu.logical_cores);
        Ok(Platform {
            options,
            main_thread_id: thread::current_thread_id(),
            heap: heap::DebugHeap::new(),
            cpu,
            os_data: info::collect_os_data(),
            performance: Mutex::new(info::collect_performance_data()),
            cpu_sampler: Mutex::new(sampler),
        })
    }

    pub fn main_thread_id(&self) -> u64 {
        self.main_thread_id
    }

    /// Whether the calling thread is the one that ran [`Platform::init`].
    pub fn is_main_thread(&self) -> bool {
        thread::current_thread_id() == self.main_thread_id
    }

    /// The process debug heap (a passthrough allocator in release
    /// builds).
    pub fn heap(&self) -> &heap::DebugHeap {
        &self.heap
    }

    pub fn cpu_data(&self) -> &CpuData {
        &self.cpu
    }

    pub fn os_data(&self) -> &OsData {
        &self.os_data
    }

    /// The most recently collected performance snapshot.
    pub fn performance_data(&self) -> PerformanceData {
        *self.performance.lock()
    }

    /// Re-reads process counters from the OS.
    pub fn refresh_performance_data(&self) -> PerformanceData {
        let fresh = info::collect_performance_data();
        *self.performance.lock() = fresh;
        fresh
    }

    /// Process CPU usage since the previous call, in [0.0, 100.0].
    pub fn cpu_usage(&self) -> f32 {
        self.cpu_sampler.lock().sample()
    }
}

impl Drop for Platform {
    fn drop(&mut self) {
        if !self.options.report_leaks_on_teardown {
            return;
        }
        let leaks = self.heap.leak_report();
        if leaks.is_empty() {
            return;
        }
        debug::output_debug_string_line(&format!("keel: {} block(s) leaked:", leaks.len()));
        for leak in leaks {
            debug::output_debug_string_line(&format!(
                "  {} bytes (tag {}) allocated at {}:{}",
                leak.size, leak.tag, leak.file, leak.line
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_populates_snapshots() {
        let platform = Platform::init(PlatformOptions::default()).unwrap();
        assert!(platform.is_main_thread());
        assert!(platform.cpu_data().logical_cores >= 1);
        assert!(!platform.os_data().name.is_empty());
        let usage = platform.cpu_usage();
        assert!((0.0..=100.0).contains(&usage));
    }

    #[test]
    fn other_threads_are_not_main() {
        let platform = Platform::init(PlatformOptions::default()).unwrap();
        let main_id = platform.main_thread_id();
        let seen = std::thread::spawn(move || thread::current_thread_id())
            .join()
            .unwrap();
        assert_ne!(main_id, seen);
    }

    #[test]
    fn endian_queries_are_consistent() {
        assert_ne!(is_little_endian(), is_big_endian());
        let probe = 1u16.to_ne_bytes();
        assert_eq!(is_little_endian(), probe[0] == 1);
    }

    #[test]
    fn facade_exposes_the_format_core() {
        let mut buf = [0u8; 32];
        let n = fmt::format_to_slice(&mut buf, b"%d/%s", &fmt_args![7, "ok"]);
        assert_eq!(&buf[..n], b"7/ok");
    }

    #[cfg(debug_assertions)]
    #[test]
    fn context_heap_tracks_allocations() {
        let platform = Platform::init(PlatformOptions {
            report_leaks_on_teardown: false,
        })
        .unwrap();
        let block = platform.heap().alloc(64, 0, alloc_site!()).unwrap();
        assert_eq!(platform.heap().stats().live_blocks, 1);
        platform.heap().free(block, alloc_site!());
        assert_eq!(platform.heap().stats().live_blocks, 0);
    }
}
