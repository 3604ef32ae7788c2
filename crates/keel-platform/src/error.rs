//! Platform error model.
//!
//! Recoverable operational failures (the file is missing, the socket
//! timed out, the OS refused a thread) surface as `Err(PlatformError)`;
//! the process never aborts for these. Contract violations (corrupted
//! guard bytes, double free) are not errors: they panic with diagnostic
//! context from the subsystem that detected them.

use std::cell::Cell;

/// Recoverable platform failure.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The backend family has no support for the operation; a defined
    /// failure, never a crash.
    #[error("operation not supported on this platform")]
    Unsupported,

    /// A wait or connect gave up after its timeout.
    #[error("operation timed out")]
    Timeout,

    /// A blocking operation was abandoned by the caller's cancel
    /// callback.
    #[error("operation cancelled by caller")]
    Cancelled,

    /// Argument rejected before reaching the OS.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),

    /// The OS reported a failure.
    #[error(transparent)]
    Os(std::io::Error),
}

impl From<std::io::Error> for PlatformError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::Unsupported => PlatformError::Unsupported,
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                PlatformError::Timeout
            }
            _ => PlatformError::Os(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;

// ---------------------------------------------------------------------------
// Last-error slot
// ---------------------------------------------------------------------------

thread_local! {
    static LAST_ERROR: Cell<i32> = const { Cell::new(0) };
}

/// Records the raw OS error code behind a sentinel-style return.
pub(crate) fn set_last_error(code: i32) {
    LAST_ERROR.with(|slot| slot.set(code));
}

pub(crate) fn capture_last_os_error() {
    set_last_error(std::io::Error::last_os_error().raw_os_error().unwrap_or(-1));
}

/// The raw OS error code recorded by the most recent failed
/// sentinel-returning call on this thread (0 when none has failed).
pub fn last_error() -> i32 {
    LAST_ERROR.with(|slot| slot.get())
}
