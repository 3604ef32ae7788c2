//! Unix backend: the only module that issues raw `libc` calls.
//!
//! Linux-only facilities (affinity, `/proc` scans, debugger probe)
//! degrade to `Unsupported` on other Unix families.

use std::ffi::CString;
use std::io;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

#[cfg_attr(target_os = "linux", allow(dead_code))]
fn unsupported() -> io::Error {
    io::Error::from(io::ErrorKind::Unsupported)
}

fn cstring(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))
}

// ---------------------------------------------------------------------------
// Thread identity, naming, priority
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
pub(crate) fn current_thread_id() -> u64 {
    (unsafe { libc::syscall(libc::SYS_gettid) }) as u64
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn current_thread_id() -> u64 {
    unsafe { libc::pthread_self() as u64 }
}

#[cfg(target_os = "linux")]
pub(crate) fn set_current_thread_name(name: &str) -> io::Result<()> {
    // The kernel caps comm names at 15 bytes plus NUL.
    let capped: String = name.chars().take(15).collect();
    let cname =
        CString::new(capped).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    let rc = unsafe { libc::pthread_setname_np(libc::pthread_self(), cname.as_ptr()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(rc))
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn set_current_thread_name(_name: &str) -> io::Result<()> {
    Err(unsupported())
}

/// Applies a 0-99 priority hint to the calling thread by mapping it onto
/// the nice range. Raising priority may be refused by the OS.
#[cfg(target_os = "linux")]
pub(crate) fn set_current_thread_priority(hint: u32) -> io::Result<()> {
    let hint = hint.min(99) as i32;
    let nice = 19 - (hint * 39) / 99;
    let rc = unsafe {
        libc::setpriority(
            libc::PRIO_PROCESS,
            current_thread_id() as libc::id_t,
            nice,
        )
    };
    if rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn set_current_thread_priority(_hint: u32) -> io::Result<()> {
    Err(unsupported())
}

// ---------------------------------------------------------------------------
// Affinity
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
fn mask_to_cpu_set(mask: u64) -> libc::cpu_set_t {
    let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    for cpu in 0..64 {
        if mask & (1u64 << cpu) != 0 {
            unsafe { libc::CPU_SET(cpu, &mut set) };
        }
    }
    set
}

#[cfg(target_os = "linux")]
fn cpu_set_to_mask(set: &libc::cpu_set_t) -> u64 {
    let mut mask = 0u64;
    for cpu in 0..64 {
        if unsafe { libc::CPU_ISSET(cpu, set) } {
            mask |= 1u64 << cpu;
        }
    }
    mask
}

/// Pins a thread (by kernel tid) or, with a process id, a whole process.
#[cfg(target_os = "linux")]
pub(crate) fn set_affinity(id: u64, mask: u64) -> io::Result<u64> {
    if mask == 0 {
        return Err(io::Error::from(io::ErrorKind::InvalidInput));
    }
    let mut previous: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    let size = size_of::<libc::cpu_set_t>();
    let rc = unsafe { libc::sched_getaffinity(id as libc::pid_t, size, &mut previous) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let set = mask_to_cpu_set(mask);
    let rc = unsafe { libc::sched_setaffinity(id as libc::pid_t, size, &set) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(cpu_set_to_mask(&previous))
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn set_affinity(_id: u64, _mask: u64) -> io::Result<u64> {
    Err(unsupported())
}

#[cfg(target_os = "linux")]
pub(crate) fn get_affinity(id: u64) -> io::Result<u64> {
    let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    let rc =
        unsafe { libc::sched_getaffinity(id as libc::pid_t, size_of::<libc::cpu_set_t>(), &mut set) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(cpu_set_to_mask(&set))
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn get_affinity(_id: u64) -> io::Result<u64> {
    Err(unsupported())
}

// ---------------------------------------------------------------------------
// Processes
// ---------------------------------------------------------------------------

pub(crate) fn process_alive(pid: u32) -> bool {
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

pub(crate) fn kill_process(pid: u32) -> io::Result<()> {
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// All process ids whose command name matches `name` (`/proc` scan).
#[cfg(target_os = "linux")]
pub(crate) fn processes_by_name(name: &str) -> io::Result<Vec<u32>> {
    let mut pids = Vec::new();
    for entry in std::fs::read_dir("/proc")? {
        let entry = entry?;
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };
        let Ok(comm) = std::fs::read_to_string(entry.path().join("comm")) else {
            continue;
        };
        if comm.trim_end() == name {
            pids.push(pid);
        }
    }
    Ok(pids)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn processes_by_name(_name: &str) -> io::Result<Vec<u32>> {
    Err(unsupported())
}

// ---------------------------------------------------------------------------
// Descriptors: peek, readiness
// ---------------------------------------------------------------------------

/// Non-consuming, non-blocking read of buffered data on a socket.
pub(crate) fn socket_peek(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let rc = unsafe {
        libc::recv(
            fd,
            buf.as_mut_ptr().cast(),
            buf.len(),
            libc::MSG_PEEK | libc::MSG_DONTWAIT,
        )
    };
    if rc >= 0 {
        return Ok(rc as usize);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock {
        Ok(0)
    } else {
        Err(err)
    }
}

/// Bytes currently buffered for reading on a descriptor.
pub(crate) fn bytes_available(fd: RawFd) -> io::Result<usize> {
    let mut count: libc::c_int = 0;
    let rc = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut count) };
    if rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(count.max(0) as usize)
    }
}

/// Waits until `fd` is writable or `timeout_ms` elapses. Returns whether
/// it became writable.
pub(crate) fn wait_writable(fd: RawFd, timeout_ms: i32) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLOUT,
        revents: 0,
    };
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    match rc {
        -1 => Err(io::Error::last_os_error()),
        0 => Ok(false),
        _ => Ok(pfd.revents & (libc::POLLOUT | libc::POLLERR | libc::POLLHUP) != 0),
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Local-timezone offset from UTC, in seconds, at the given instant.
pub(crate) fn local_utc_offset_seconds(epoch_seconds: i64) -> i64 {
    let time = epoch_seconds as libc::time_t;
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::localtime_r(&time, &mut tm) };
    if result.is_null() { 0 } else { tm.tm_gmtoff as i64 }
}

/// Sets access/write times on an open file; `None` leaves a time as-is.
pub(crate) fn set_file_times(
    fd: RawFd,
    access_millis: Option<i64>,
    write_millis: Option<i64>,
) -> io::Result<()> {
    fn spec(millis: Option<i64>) -> libc::timespec {
        match millis {
            Some(ms) => libc::timespec {
                tv_sec: (ms.div_euclid(1000)) as libc::time_t,
                tv_nsec: (ms.rem_euclid(1000) * 1_000_000) as _,
            },
            None => libc::timespec {
                tv_sec: 0,
                tv_nsec: libc::UTIME_OMIT as _,
            },
        }
    }
    let times = [spec(access_millis), spec(write_millis)];
    let rc = unsafe { libc::futimens(fd, times.as_ptr()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

// ---------------------------------------------------------------------------
// Memory mapping
// ---------------------------------------------------------------------------

pub(crate) fn map_file(fd: RawFd, len: usize) -> io::Result<*mut u8> {
    if len == 0 {
        return Err(io::Error::from(io::ErrorKind::InvalidInput));
    }
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        Err(io::Error::last_os_error())
    } else {
        Ok(ptr.cast())
    }
}

pub(crate) fn unmap_file(ptr: *mut u8, len: usize) {
    unsafe { libc::munmap(ptr.cast(), len) };
}

// ---------------------------------------------------------------------------
// System queries
// ---------------------------------------------------------------------------

pub(crate) fn disk_space(path: &Path) -> io::Result<(u64, u64)> {
    let cpath = cstring(path)?;
    let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(cpath.as_ptr(), &mut stats) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let frag = stats.f_frsize as u64;
    Ok((stats.f_bavail as u64 * frag, stats.f_blocks as u64 * frag))
}

pub(crate) fn logical_cpu_count() -> usize {
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if n > 0 { n as usize } else { 1 }
}

pub(crate) fn total_memory_bytes() -> u64 {
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if pages > 0 && page_size > 0 {
        pages as u64 * page_size as u64
    } else {
        0
    }
}

fn utsname_field(field: &[libc::c_char]) -> String {
    let bytes: Vec<u8> = field
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Kernel name and release, e.g. ("Linux", "6.1.0").
pub(crate) fn os_name_version() -> (String, String) {
    let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
    if unsafe { libc::uname(&mut uts) } != 0 {
        return (String::from("unix"), String::new());
    }
    (utsname_field(&uts.sysname), utsname_field(&uts.release))
}

#[cfg(target_os = "linux")]
pub(crate) fn cpu_identity() -> (String, u64) {
    let Ok(info) = std::fs::read_to_string("/proc/cpuinfo") else {
        return (String::new(), 0);
    };
    let mut model = String::new();
    let mut mhz = 0u64;
    for line in info.lines() {
        if model.is_empty() && line.starts_with("model name") {
            if let Some((_, v)) = line.split_once(':') {
                model = v.trim().to_string();
            }
        }
        if mhz == 0 && line.starts_with("cpu MHz") {
            if let Some((_, v)) = line.split_once(':') {
                mhz = v.trim().parse::<f64>().unwrap_or(0.0) as u64;
            }
        }
    }
    (model, mhz)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn cpu_identity() -> (String, u64) {
    (String::new(), 0)
}

// ---------------------------------------------------------------------------
// Self inspection
// ---------------------------------------------------------------------------

/// (virtual bytes, resident bytes) of the calling process.
#[cfg(target_os = "linux")]
pub(crate) fn self_memory() -> io::Result<(u64, u64)> {
    let statm = std::fs::read_to_string("/proc/self/statm")?;
    let mut fields = statm.split_whitespace();
    let pages_virtual: u64 = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
    let pages_resident: u64 = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) }.max(0) as u64;
    Ok((pages_virtual * page, pages_resident * page))
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn self_memory() -> io::Result<(u64, u64)> {
    Err(unsupported())
}

#[cfg(target_os = "linux")]
pub(crate) fn self_major_page_faults() -> io::Result<u64> {
    let stat = std::fs::read_to_string("/proc/self/stat")?;
    // majflt is the 10th whitespace field after the parenthesized comm.
    let after_comm = stat
        .rsplit_once(')')
        .map(|(_, rest)| rest)
        .unwrap_or(&stat);
    after_comm
        .split_whitespace()
        .nth(9)
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidData))
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn self_major_page_faults() -> io::Result<u64> {
    Err(unsupported())
}

/// CPU time (user + system) consumed by the calling process, in
/// milliseconds.
pub(crate) fn self_cpu_time_millis() -> io::Result<u64> {
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let to_millis = |tv: libc::timeval| tv.tv_sec as u64 * 1000 + tv.tv_usec as u64 / 1000;
    Ok(to_millis(usage.ru_utime) + to_millis(usage.ru_stime))
}

/// CPU time consumed by the calling thread, in milliseconds.
#[cfg(target_os = "linux")]
pub(crate) fn thread_cpu_time_millis() -> io::Result<u64> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, &mut ts) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ts.tv_sec as u64 * 1000 + ts.tv_nsec as u64 / 1_000_000)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn thread_cpu_time_millis() -> io::Result<u64> {
    Err(unsupported())
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
pub(crate) fn is_debugger_present() -> bool {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return false;
    };
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|v| v.trim().parse::<u32>().ok())
        .is_some_and(|pid| pid != 0)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn is_debugger_present() -> bool {
    false
}

pub(crate) fn debug_break() {
    unsafe { libc::raise(libc::SIGTRAP) };
}
