//! Process creation and control.
//!
//! Spawning parses a single command line (with double-quote grouping),
//! applies an optional working directory and creation flags, and yields
//! an owning [`ChildProcess`]. Liveness, termination, enumeration by
//! name, and process-level affinity mirror the thread-side surface.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use keel_core::text::wide_to_string;

use crate::error::{PlatformError, Result};
use crate::os;

// ---------------------------------------------------------------------------
// Creation options
// ---------------------------------------------------------------------------

/// Process creation flags.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Working directory for the child; inherits ours when `None`.
    pub working_dir: Option<PathBuf>,
    /// Detach the child's standard streams instead of inheriting them.
    pub detached_streams: bool,
}

// ---------------------------------------------------------------------------
// Command-line splitting
// ---------------------------------------------------------------------------

/// Splits a command line into program + arguments. Double quotes group
/// words; there is no escape processing beyond that.
fn split_command_line(command_line: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in command_line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

// ---------------------------------------------------------------------------
// ChildProcess
// ---------------------------------------------------------------------------

/// Owning handle to a spawned process. Dropping the handle does not kill
/// the child; `terminate` does.
pub struct ChildProcess {
    child: std::process::Child,
}

impl ChildProcess {
    /// Launches `command_line` with the given options.
    pub fn spawn(command_line: &str, options: &ProcessOptions) -> Result<Self> {
        let parts = split_command_line(command_line);
        let (program, args) = parts
            .split_first()
            .ok_or(PlatformError::Invalid("empty command line"))?;
        let mut command = Command::new(program);
        command.args(args);
        if let Some(dir) = &options.working_dir {
            command.current_dir(dir);
        }
        if options.detached_streams {
            command
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
        }
        let child = command.spawn().map_err(PlatformError::from)?;
        Ok(Self { child })
    }

    /// Wide-string variant of [`ChildProcess::spawn`].
    pub fn spawn_wide(command_line: &[u16], options: &ProcessOptions) -> Result<Self> {
        Self::spawn(&wide_to_string(command_line), options)
    }

    /// OS process id of the child.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Whether the child has not yet exited.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Forcibly terminates the child.
    pub fn terminate(&mut self) -> Result<()> {
        self.child.kill().map_err(PlatformError::from)?;
        // Reap so the pid is not left as a zombie.
        let _ = self.child.wait();
        Ok(())
    }

    /// Blocks until the child exits; returns its exit code.
    pub fn wait(&mut self) -> Result<u32> {
        let status = self.child.wait().map_err(PlatformError::from)?;
        Ok(status.code().unwrap_or(-1) as u32)
    }

    /// Pins the child process to the CPUs in `mask`; returns the
    /// previous mask, or `Unsupported` where the backend cannot pin.
    pub fn set_affinity(&self, mask: u64) -> Result<u64> {
        Ok(os::set_affinity(u64::from(self.id()), mask)?)
    }

    pub fn affinity(&self) -> Result<u64> {
        Ok(os::get_affinity(u64::from(self.id()))?)
    }
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Whether a process with this id is currently alive.
pub fn process_alive(pid: u32) -> bool {
    os::process_alive(pid)
}

/// Forcibly terminates an arbitrary process by id.
pub fn terminate_process(pid: u32) -> Result<()> {
    Ok(os::kill_process(pid)?)
}

/// Ids of all processes whose executable name matches `name`.
pub fn find_processes_by_name(name: &str) -> Result<Vec<u32>> {
    Ok(os::processes_by_name(name)?)
}

/// Wide variant of [`find_processes_by_name`].
pub fn find_processes_by_name_wide(name: &[u16]) -> Result<Vec<u32>> {
    find_processes_by_name(&wide_to_string(name))
}

/// Whether at least one process with this executable name exists.
pub fn has_process(name: &str) -> bool {
    find_processes_by_name(name).map(|pids| !pids.is_empty()).unwrap_or(false)
}

pub fn current_process_id() -> u32 {
    std::process::id()
}

/// Ends the calling process with `exit_code`. Destructors do not run.
pub fn exit_process(exit_code: u32) -> ! {
    std::process::exit(exit_code as i32)
}

/// Relaunches the current executable with the same arguments, then ends
/// the calling process.
pub fn restart_current_process() -> Result<()> {
    let exe = std::env::current_exe().map_err(PlatformError::from)?;
    let mut command = Command::new(exe);
    command.args(std::env::args().skip(1));
    command.spawn().map_err(PlatformError::from)?;
    exit_process(0)
}

/// Process-level affinity by pid; returns the previous mask.
pub fn set_process_affinity(pid: u32, mask: u64) -> Result<u64> {
    Ok(os::set_affinity(u64::from(pid), mask)?)
}

pub fn get_process_affinity(pid: u32) -> Result<u64> {
    Ok(os::get_affinity(u64::from(pid))?)
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Reads a process environment variable.
pub fn environment(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Wide variant of [`environment`].
pub fn environment_wide(name: &[u16]) -> Option<String> {
    environment(&wide_to_string(name))
}

/// Sets a process environment variable.
///
/// # Safety
///
/// The process environment is global, unsynchronized state; callers
/// must not race this with other threads reading the environment.
pub unsafe fn set_environment(name: &str, value: &str) {
    unsafe { std::env::set_var(name, value) };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
