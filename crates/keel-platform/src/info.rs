//! Process, CPU, and OS snapshots.
//!
//! These are populated at [`crate::Platform::init`] and refreshed only
//! by explicit calls; every value returned is a snapshot that may be
//! stale by the time it is inspected.

use std::time::Instant;

use crate::os;

/// Process-wide resource counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerformanceData {
    pub virtual_bytes: u64,
    pub resident_bytes: u64,
    pub major_page_faults: u64,
    pub cpu_time_millis: u64,
}

/// Processor description.
#[derive(Debug, Clone, Default)]
pub struct CpuData {
    pub logical_cores: usize,
    pub model: String,
    pub frequency_mhz: u64,
}

/// Operating-system description.
#[derive(Debug, Clone, Default)]
pub struct OsData {
    pub name: String,
    pub version: String,
    pub total_memory_bytes: u64,
}

pub(crate) fn collect_performance_data() -> PerformanceData {
    let (virtual_bytes, resident_bytes) = os::self_memory().unwrap_or((0, 0));
    PerformanceData {
        virtual_bytes,
        resident_bytes,
        major_page_faults: os::self_major_page_faults().unwrap_or(0),
        cpu_time_millis: os::self_cpu_time_millis().unwrap_or(0),
    }
}

pub(crate) fn collect_cpu_data() -> CpuData {
    let (model, frequency_mhz) = os::cpu_identity();
    CpuData {
        logical_cores: os::logical_cpu_count(),
        model,
        frequency_mhz,
    }
}

pub(crate) fn collect_os_data() -> OsData {
    let (name, version) = os::os_name_version();
    OsData {
        name,
        version,
        total_memory_bytes: os::total_memory_bytes(),
    }
}

/// Two-sample process CPU usage estimator.
pub(crate) struct CpuUsageSampler {
    last_cpu_millis: u64,
    last_instant: Instant,
    cores: usize,
}

impl CpuUsageSampler {
    pub(crate) fn new(cores: usize) -> Self {
        Self {
            last_cpu_millis: os::self_cpu_time_millis().unwrap_or(0),
            last_instant: Instant::now(),
            cores: cores.max(1),
        }
    }

    /// Percentage of total machine capacity this process used since the
    /// previous sample, in [0.0, 100.0].
    pub(crate) fn sample(&mut self) -> f32 {
        let now = Instant::now();
        let cpu = os::self_cpu_time_millis().unwrap_or(self.last_cpu_millis);
        let wall = now.duration_since(self.last_instant).as_millis() as u64;
        let used = cpu.saturating_sub(self.last_cpu_millis);
        self.last_cpu_millis = cpu;
        self.last_instant = now;
        if wall == 0 {
            return 0.0;
        }
        let percent = used as f64 * 100.0 / (wall as f64 * self.cores as f64);
        percent.clamp(0.0, 100.0) as f32
    }
}

// ---------------------------------------------------------------------------
// Version resources
// ---------------------------------------------------------------------------

/// Size of a file's embedded version-information resource.
///
/// Version resources exist only in PE images; backends without them
/// report the defined failure instead of inventing shim semantics.
pub fn file_version_info_size(_path: &std::path::Path) -> crate::Result<u32> {
    Err(crate::PlatformError::Unsupported)
}

/// Reads a file's embedded version-information resource.
pub fn file_version_info(_path: &std::path::Path) -> crate::Result<Vec<u8>> {
    Err(crate::PlatformError::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_are_populated() {
        let cpu = collect_cpu_data();
        assert!(cpu.logical_cores >= 1);
        let os_data = collect_os_data();
        assert!(!os_data.name.is_empty());
    }

    #[test]
    fn version_queries_are_a_defined_failure_here() {
        let exe = std::env::current_exe().unwrap();
        assert!(matches!(
            file_version_info_size(&exe),
            Err(crate::PlatformError::Unsupported)
        ));
        assert!(matches!(
            file_version_info(&exe),
            Err(crate::PlatformError::Unsupported)
        ));
    }

    #[test]
    fn cpu_usage_stays_in_range() {
        let mut sampler = CpuUsageSampler::new(collect_cpu_data().logical_cores);
        // Burn a little CPU between samples.
        let mut acc = 0u64;
        for i in 0..2_000_000u64 {
            acc = acc.wrapping_add(i * i);
        }
        std::hint::black_box(acc);
        let usage = sampler.sample();
        assert!((0.0..=100.0).contains(&usage));
    }
}
