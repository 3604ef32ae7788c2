//! Debug memory heap.
//!
//! In debug builds every allocation is prepended with a registry header
//! and bracketed by guard regions filled with a fixed pattern. Freeing
//! validates both guards, overwrites the payload with a distinct
//! pattern (making use-after-free visible), and unlinks the block from
//! the registry, so leaks can be dumped at teardown. Guard corruption,
//! double free, and foreign pointers are contract violations: they
//! panic with the offending allocation site rather than continuing past
//! corrupted state.
//!
//! In release builds the same API forwards straight to the platform
//! allocator; nothing is tracked.

use std::ptr::NonNull;

#[cfg(debug_assertions)]
use std::collections::HashSet;

#[cfg(debug_assertions)]
use parking_lot::Mutex;

/// Byte count of each guard region.
pub const GUARD_BYTES: usize = 4;
/// Pattern filling both guard regions.
pub const GUARD_FILL: u8 = 0xFD;
/// Pattern filling a fresh payload.
pub const FRESH_FILL: u8 = 0xCD;
/// Pattern overwriting a freed payload.
pub const FREED_FILL: u8 = 0xDD;

#[cfg(debug_assertions)]
const PAYLOAD_ALIGN: usize = 16;

/// Source location of an allocation, captured by [`alloc_site!`].
#[derive(Debug, Clone, Copy)]
pub struct AllocSite {
    pub file: &'static str,
    pub line: u32,
}

/// Captures the current source location as an [`AllocSite`].
#[macro_export]
macro_rules! alloc_site {
    () => {
        $crate::heap::AllocSite {
            file: file!(),
            line: line!(),
        }
    };
}

/// Registry counters snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapStats {
    pub live_blocks: usize,
    pub live_bytes: usize,
    pub peak_bytes: usize,
    pub total_allocations: u64,
}

/// One outstanding allocation, as reported at teardown.
#[derive(Debug, Clone)]
pub struct LeakRecord {
    pub file: &'static str,
    pub line: u32,
    pub size: usize,
    pub tag: u32,
    pub sequence: u64,
}

// ---------------------------------------------------------------------------
// Debug-build implementation
// ---------------------------------------------------------------------------

#[cfg(debug_assertions)]
#[repr(C)]
struct BlockHeader {
    prev: *mut BlockHeader,
    next: *mut BlockHeader,
    size: usize,
    file: &'static str,
    line: u32,
    tag: u32,
    sequence: u64,
}

#[cfg(debug_assertions)]
const fn payload_offset() -> usize {
    let raw = size_of::<BlockHeader>() + GUARD_BYTES;
    (raw + PAYLOAD_ALIGN - 1) / PAYLOAD_ALIGN * PAYLOAD_ALIGN
}

#[cfg(debug_assertions)]
struct Registry {
    head: *mut BlockHeader,
    live: HashSet<usize>,
    freed: HashSet<usize>,
    live_bytes: usize,
    peak_bytes: usize,
    total_allocations: u64,
    next_sequence: u64,
}

// Raw registry pointers are only touched under the mutex.
#[cfg(debug_assertions)]
unsafe impl Send for Registry {}

/// Tracking allocator wrapping the platform allocator.
pub struct DebugHeap {
    #[cfg(debug_assertions)]
    registry: Mutex<Registry>,
}

impl Default for DebugHeap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(debug_assertions)]
impl DebugHeap {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                head: std::ptr::null_mut(),
                live: HashSet::new(),
                freed: HashSet::new(),
                live_bytes: 0,
                peak_bytes: 0,
                total_allocations: 0,
                next_sequence: 1,
            }),
        }
    }

    /// Allocates `size` bytes (zero rounds up to one). Returns `None`
    /// only when the platform allocator fails.
    pub fn alloc(&self, size: usize, tag: u32, site: AllocSite) -> Option<NonNull<u8>> {
        let size = size.max(1);
        let total = payload_offset() + size + GUARD_BYTES;
        let block = unsafe { libc::malloc(total) }.cast::<u8>();
        if block.is_null() {
            return None;
        }

        let mut registry = self.registry.lock();
        let sequence = registry.next_sequence;
        registry.next_sequence += 1;

        let header = block.cast::<BlockHeader>();
        unsafe {
            header.write(BlockHeader {
                prev: std::ptr::null_mut(),
                next: registry.head,
                size,
                file: site.file,
                line: site.line,
                tag,
                sequence,
            });
            if !registry.head.is_null() {
                (*registry.head).prev = header;
            }
            registry.head = header;

            let payload = block.add(payload_offset());
            payload.sub(GUARD_BYTES).write_bytes(GUARD_FILL, GUARD_BYTES);
            payload.write_bytes(FRESH_FILL, size);
            payload.add(size).write_bytes(GUARD_FILL, GUARD_BYTES);

            registry.live.insert(payload as usize);
            registry.freed.remove(&(payload as usize));
            registry.live_bytes += size;
            registry.peak_bytes = registry.peak_bytes.max(registry.live_bytes);
            registry.total_allocations += 1;

            Some(NonNull::new_unchecked(payload))
        }
    }

    /// Releases a block, validating both guard regions and overwriting
    /// the payload with [`FREED_FILL`].
    ///
    /// # Panics
    ///
    /// Double free, a pointer this heap never produced, and guard
    /// corruption are fatal contract violations.
    pub fn free(&self, ptr: NonNull<u8>, site: AllocSite) {
        let addr = ptr.as_ptr() as usize;
        let mut registry = self.registry.lock();
        if !registry.live.remove(&addr) {
            if registry.freed.contains(&addr) {
                panic!(
                    "debug heap: block {:#x} freed twice (second free at {}:{})",
                    addr, site.file, site.line
                );
            }
            panic!(
                "debug heap: free of unknown pointer {:#x} at {}:{}",
                addr, site.file, site.line
            );
        }

        let header = unsafe { ptr.as_ptr().sub(payload_offset()).cast::<BlockHeader>() };
        unsafe {
            Self::check_guards(header, ptr.as_ptr());

            // Unlink.
            let prev = (*header).prev;
            let next = (*header).next;
            if !prev.is_null() {
                (*prev).next = next;
            } else {
                registry.head = next;
            }
            if !next.is_null() {
                (*next).prev = prev;
            }

            registry.live_bytes -= (*header).size;
            registry.freed.insert(addr);

            ptr.as_ptr().write_bytes(FREED_FILL, (*header).size);
            libc::free(header.cast());
        }
    }

    /// Grows or shrinks a block, preserving the smaller of the old and
    /// new payload sizes and re-establishing guards at the new
    /// boundaries. Panics as [`DebugHeap::free`] does on misuse.
    pub fn realloc(
        &self,
        ptr: NonNull<u8>,
        new_size: usize,
        tag: u32,
        site: AllocSite,
    ) -> Option<NonNull<u8>> {
        let old_size = {
            let registry = self.registry.lock();
            if !registry.live.contains(&(ptr.as_ptr() as usize)) {
                panic!(
                    "debug heap: realloc of unknown pointer {:#x} at {}:{}",
                    ptr.as_ptr() as usize,
                    site.file,
                    site.line
                );
            }
            unsafe { (*ptr.as_ptr().sub(payload_offset()).cast::<BlockHeader>()).size }
        };

        let replacement = self.alloc(new_size, tag, site)?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                replacement.as_ptr(),
                old_size.min(new_size.max(1)),
            );
        }
        self.free(ptr, site);
        Some(replacement)
    }

    /// Validates the guard regions of a live block immediately.
    ///
    /// # Panics
    ///
    /// On guard corruption or a pointer this heap never produced.
    pub fn validate(&self, ptr: NonNull<u8>) {
        let registry = self.registry.lock();
        if !registry.live.contains(&(ptr.as_ptr() as usize)) {
            panic!(
                "debug heap: validate of unknown pointer {:#x}",
                ptr.as_ptr() as usize
            );
        }
        let header = unsafe { ptr.as_ptr().sub(payload_offset()).cast::<BlockHeader>() };
        unsafe { Self::check_guards(header, ptr.as_ptr()) };
    }

    unsafe fn check_guards(header: *mut BlockHeader, payload: *mut u8) {
        let size = unsafe { (*header).size };
        let front = unsafe { std::slice::from_raw_parts(payload.sub(GUARD_BYTES), GUARD_BYTES) };
        let rear = unsafe { std::slice::from_raw_parts(payload.add(size), GUARD_BYTES) };
        for (region, bytes) in [("front", front), ("rear", rear)] {
            if bytes.iter().any(|&b| b != GUARD_FILL) {
                let (file, line) = unsafe { ((*header).file, (*header).line) };
                panic!(
                    "debug heap: {region} guard bytes corrupted on block allocated at {file}:{line} (size {size})"
                );
            }
        }
    }

    pub fn stats(&self) -> HeapStats {
        let registry = self.registry.lock();
        HeapStats {
            live_blocks: registry.live.len(),
            live_bytes: registry.live_bytes,
            peak_bytes: registry.peak_bytes,
            total_allocations: registry.total_allocations,
        }
    }

    /// Outstanding allocations, newest first.
    pub fn leak_report(&self) -> Vec<LeakRecord> {
        let registry = self.registry.lock();
        let mut leaks = Vec::new();
        let mut cursor = registry.head;
        while !cursor.is_null() {
            unsafe {
                leaks.push(LeakRecord {
                    file: (*cursor).file,
                    line: (*cursor).line,
                    size: (*cursor).size,
                    tag: (*cursor).tag,
                    sequence: (*cursor).sequence,
                });
                cursor = (*cursor).next;
            }
        }
        leaks
    }
}

#[cfg(debug_assertions)]
impl Drop for DebugHeap {
    fn drop(&mut self) {
        // Reclaim whatever leaked; the leak report is the diagnostic,
        // teardown still releases the memory.
        let registry = self.registry.get_mut();
        let mut cursor = registry.head;
        while !cursor.is_null() {
            let next = unsafe { (*cursor).next };
            unsafe { libc::free(cursor.cast()) };
            cursor = next;
        }
        registry.head = std::ptr::null_mut();
    }
}

// ---------------------------------------------------------------------------
// Release-build passthrough
// ---------------------------------------------------------------------------

#[cfg(not(debug_assertions))]
impl DebugHeap {
    pub fn new() -> Self {
        Self {}
    }

    pub fn alloc(&self, size: usize, _tag: u32, _site: AllocSite) -> Option<NonNull<u8>> {
        NonNull::new(unsafe { libc::malloc(size.max(1)) }.cast())
    }

    pub fn free(&self, ptr: NonNull<u8>, _site: AllocSite) {
        unsafe { libc::free(ptr.as_ptr().cast()) };
    }

    pub fn realloc(
        &self,
        ptr: NonNull<u8>,
        new_size: usize,
        _tag: u32,
        _site: AllocSite,
    ) -> Option<NonNull<u8>> {
        NonNull::new(unsafe { libc::realloc(ptr.as_ptr().cast(), new_size.max(1)) }.cast())
    }

    pub fn validate(&self, _ptr: NonNull<u8>) {}

    pub fn stats(&self) -> HeapStats {
        HeapStats::default()
    }

    pub fn leak_report(&self) -> Vec<LeakRecord> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, debug_assertions))]
mod tests {
    use super::*;

    #[test]
    fn alloc_free_round_trip_updates_stats() {
        let heap = DebugHeap::new();
        let a = heap.alloc(32, 1, alloc_site!()).unwrap();
        let b = heap.alloc(64, 2, alloc_site!()).unwrap();

        let stats = heap.stats();
        assert_eq!(stats.live_blocks, 2);
        assert_eq!(stats.live_bytes, 96);
        assert_eq!(stats.total_allocations, 2);

        heap.free(a, alloc_site!());
        heap.free(b, alloc_site!());
        let stats = heap.stats();
        assert_eq!(stats.live_blocks, 0);
        assert_eq!(stats.live_bytes, 0);
        assert_eq!(stats.peak_bytes, 96);
    }

    #[test]
    fn fresh_payload_carries_fill_pattern_and_alignment() {
        let heap = DebugHeap::new();
        let ptr = heap.alloc(16, 0, alloc_site!()).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 16, 0);
        let payload = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 16) };
        assert!(payload.iter().all(|&b| b == FRESH_FILL));
        heap.free(ptr, alloc_site!());
    }

    #[test]
    fn writes_within_bounds_pass_validation() {
        let heap = DebugHeap::new();
        let ptr = heap.alloc(8, 0, alloc_site!()).unwrap();
        unsafe { ptr.as_ptr().write_bytes(0xAB, 8) };
        heap.validate(ptr);
        heap.free(ptr, alloc_site!());
    }

    #[test]
    #[should_panic(expected = "rear guard bytes corrupted")]
    fn overrun_is_detected_at_free() {
        let heap = DebugHeap::new();
        let ptr = heap.alloc(8, 0, alloc_site!()).unwrap();
        unsafe { ptr.as_ptr().add(8).write(0x00) };
        heap.free(ptr, alloc_site!());
    }

    #[test]
    #[should_panic(expected = "front guard bytes corrupted")]
    fn underrun_is_detected_at_validate() {
        let heap = DebugHeap::new();
        let ptr = heap.alloc(8, 0, alloc_site!()).unwrap();
        unsafe { ptr.as_ptr().sub(1).write(0x00) };
        heap.validate(ptr);
    }

    #[test]
    #[should_panic(expected = "freed twice")]
    fn double_free_is_fatal() {
        let heap = DebugHeap::new();
        let ptr = heap.alloc(8, 0, alloc_site!()).unwrap();
        heap.free(ptr, alloc_site!());
        heap.free(ptr, alloc_site!());
    }

    #[test]
    #[should_panic(expected = "unknown pointer")]
    fn foreign_pointer_is_fatal() {
        let heap = DebugHeap::new();
        let mut local = 0u8;
        heap.free(NonNull::new(&mut local).unwrap(), alloc_site!());
    }

    #[test]
    fn realloc_preserves_smaller_payload_and_guards() {
        let heap = DebugHeap::new();
        let ptr = heap.alloc(4, 0, alloc_site!()).unwrap();
        unsafe {
            ptr.as_ptr().copy_from_nonoverlapping(b"keel".as_ptr(), 4);
        }
        let grown = heap.realloc(ptr, 32, 0, alloc_site!()).unwrap();
        let prefix = unsafe { std::slice::from_raw_parts(grown.as_ptr(), 4) };
        assert_eq!(prefix, b"keel");
        heap.validate(grown);

        let shrunk = heap.realloc(grown, 2, 0, alloc_site!()).unwrap();
        let prefix = unsafe { std::slice::from_raw_parts(shrunk.as_ptr(), 2) };
        assert_eq!(prefix, b"ke");
        heap.free(shrunk, alloc_site!());
        assert_eq!(heap.stats().live_blocks, 0);
    }

    #[test]
    fn leak_report_names_the_site() {
        let heap = DebugHeap::new();
        let kept = heap.alloc(24, 7, alloc_site!()).unwrap();
        let kept_line = line!() - 1;
        let freed = heap.alloc(8, 0, alloc_site!()).unwrap();
        heap.free(freed, alloc_site!());

        let leaks = heap.leak_report();
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].size, 24);
        assert_eq!(leaks[0].tag, 7);
        assert!(leaks[0].file.ends_with("heap.rs"));
        assert_eq!(leaks[0].line, kept_line);
        heap.free(kept, alloc_site!());
    }
}
