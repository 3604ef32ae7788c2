//! OS backend selection.
//!
//! One backend module per target family, all exposing the same internal
//! surface; the rest of the crate calls `os::*` and never branches on
//! the target itself. Operations a backend cannot provide return
//! `ErrorKind::Unsupported`, which the error layer maps to the defined
//! `PlatformError::Unsupported` outcome.

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub(crate) use unix::*;
