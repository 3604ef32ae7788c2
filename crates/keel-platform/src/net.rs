//! Socket primitives.
//!
//! Sockets are parameterized by address family, transport kind, and
//! blocking mode. Connect polls a caller-supplied abort callback so an
//! otherwise-blocking attempt stays cancellable without an async
//! completion mechanism. Transfer calls use the sentinel contract: the
//! byte count on success, 0 for clean closure, -1 for an error whose
//! code the last-error query returns. No retry is performed here; that
//! policy belongs to the caller.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Instant;

use crate::error::{PlatformError, Result, capture_last_os_error};
use crate::os;

/// Interval at which a connect attempt polls its abort callback.
const CONNECT_POLL_MILLIS: i32 = 100;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    fn raw(self) -> libc::c_int {
        match self {
            AddressFamily::Ipv4 => libc::AF_INET,
            AddressFamily::Ipv6 => libc::AF_INET6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Stream,
    Datagram,
    Raw,
    SeqPacket,
}

impl SocketKind {
    fn raw(self) -> libc::c_int {
        match self {
            SocketKind::Stream => libc::SOCK_STREAM,
            SocketKind::Datagram => libc::SOCK_DGRAM,
            SocketKind::Raw => libc::SOCK_RAW,
            SocketKind::SeqPacket => libc::SOCK_SEQPACKET,
        }
    }
}

// ---------------------------------------------------------------------------
// Address helpers
// ---------------------------------------------------------------------------

/// Resolves a host name to its first IPv4 address.
pub fn resolve_host_ipv4(host: &str) -> Result<Ipv4Addr> {
    let addrs = (host, 0u16).to_socket_addrs().map_err(PlatformError::from)?;
    for addr in addrs {
        if let IpAddr::V4(v4) = addr.ip() {
            return Ok(v4);
        }
    }
    Err(PlatformError::Invalid("host has no IPv4 address"))
}

/// Address family of the first resolution result for host:port.
pub fn address_family_of(host: &str, port: u16) -> Result<AddressFamily> {
    let mut addrs = (host, port).to_socket_addrs().map_err(PlatformError::from)?;
    match addrs.next() {
        Some(SocketAddr::V4(_)) => Ok(AddressFamily::Ipv4),
        Some(SocketAddr::V6(_)) => Ok(AddressFamily::Ipv6),
        None => Err(PlatformError::Invalid("host does not resolve")),
    }
}

fn sockaddr_storage(addr: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let len = match addr {
        SocketAddr::V4(v4) => {
            let mut sin: libc::sockaddr_in = unsafe { std::mem::zeroed() };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_port = v4.port().to_be();
            sin.sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
            unsafe {
                std::ptr::write((&raw mut storage).cast(), sin);
            }
            size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let mut sin6: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = v6.port().to_be();
            sin6.sin6_flowinfo = v6.flowinfo();
            sin6.sin6_addr.s6_addr = v6.ip().octets();
            sin6.sin6_scope_id = v6.scope_id();
            unsafe {
                std::ptr::write((&raw mut storage).cast(), sin6);
            }
            size_of::<libc::sockaddr_in6>()
        }
    };
    (storage, len as libc::socklen_t)
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// Owning socket handle; the descriptor closes exactly once, on drop.
pub struct Socket {
    fd: OwnedFd,
    family: AddressFamily,
    blocking: bool,
}

impl Socket {
    /// Creates an unbound socket.
    pub fn new(family: AddressFamily, kind: SocketKind, blocking: bool) -> Result<Self> {
        let fd = unsafe { libc::socket(family.raw(), kind.raw(), 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }
        let socket = Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
            family,
            blocking,
        };
        socket.set_blocking(blocking)?;
        Ok(socket)
    }

    /// Creates a socket bound to `port` on all interfaces and listening
    /// with the given backlog.
    pub fn listen(
        family: AddressFamily,
        kind: SocketKind,
        blocking: bool,
        port: u16,
        backlog: u32,
    ) -> Result<Self> {
        let socket = Self::new(family, kind, blocking)?;

        let reuse: libc::c_int = 1;
        unsafe {
            libc::setsockopt(
                socket.raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                (&raw const reuse).cast(),
                size_of::<libc::c_int>() as libc::socklen_t,
            );
        }

        let addr = match family {
            AddressFamily::Ipv4 => SocketAddr::from(([0, 0, 0, 0], port)),
            AddressFamily::Ipv6 => SocketAddr::from(([0u16; 8], port)),
        };
        let (storage, len) = sockaddr_storage(&addr);
        let rc = unsafe { libc::bind(socket.raw_fd(), (&raw const storage).cast(), len) };
        if rc != 0 {
            return Err(io::Error::last_os_error().into());
        }
        let rc = unsafe { libc::listen(socket.raw_fd(), backlog.min(4096) as libc::c_int) };
        if rc != 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(socket)
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    fn set_blocking(&self, blocking: bool) -> Result<()> {
        let flags = unsafe { libc::fcntl(self.raw_fd(), libc::F_GETFL) };
        if flags < 0 {
            return Err(io::Error::last_os_error().into());
        }
        let flags = if blocking {
            flags & !libc::O_NONBLOCK
        } else {
            flags | libc::O_NONBLOCK
        };
        let rc = unsafe { libc::fcntl(self.raw_fd(), libc::F_SETFL, flags) };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    /// Accepts one pending connection; the new socket inherits this
    /// socket's blocking mode.
    pub fn accept(&self) -> Result<Socket> {
        let fd = unsafe { libc::accept(self.raw_fd(), std::ptr::null_mut(), std::ptr::null_mut()) };
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }
        let accepted = Socket {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
            family: self.family,
            blocking: self.blocking,
        };
        accepted.set_blocking(self.blocking)?;
        Ok(accepted)
    }

    /// Connects to host:port. The `should_abort` callback is polled
    /// roughly every 100 ms with the elapsed milliseconds; returning
    /// `true` abandons the attempt with `Cancelled`.
    pub fn connect(
        &self,
        host: &str,
        port: u16,
        mut should_abort: impl FnMut(u32) -> bool,
    ) -> Result<()> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(PlatformError::from)?
            .find(|a| match self.family {
                AddressFamily::Ipv4 => a.is_ipv4(),
                AddressFamily::Ipv6 => a.is_ipv6(),
            })
            .ok_or(PlatformError::Invalid("host does not resolve for family"))?;

        // Drive the attempt in non-blocking mode so the abort callback
        // stays responsive, then restore the caller's choice.
        self.set_blocking(false)?;
        let result = self.connect_nonblocking(&addr, &mut should_abort);
        let restore = self.set_blocking(self.blocking);
        result.and(restore)
    }

    fn connect_nonblocking(
        &self,
        addr: &SocketAddr,
        should_abort: &mut impl FnMut(u32) -> bool,
    ) -> Result<()> {
        let (storage, len) = sockaddr_storage(addr);
        let rc = unsafe { libc::connect(self.raw_fd(), (&raw const storage).cast(), len) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINPROGRESS) {
            return Err(err.into());
        }

        let started = Instant::now();
        loop {
            let writable = os::wait_writable(self.raw_fd(), CONNECT_POLL_MILLIS)?;
            if writable {
                // Writability only means the attempt finished; the
                // verdict is in SO_ERROR.
                let pending = self.pending_error();
                return if pending == 0 {
                    Ok(())
                } else {
                    Err(io::Error::from_raw_os_error(pending).into())
                };
            }
            let elapsed = started.elapsed().as_millis() as u32;
            if should_abort(elapsed) {
                return Err(PlatformError::Cancelled);
            }
        }
    }

    /// Receives into `buf`. Sentinel contract: byte count, 0 on clean
    /// closure, -1 on error (code via [`crate::error::last_error`]).
    pub fn read(&self, buf: &mut [u8]) -> isize {
        let rc = unsafe { libc::recv(self.raw_fd(), buf.as_mut_ptr().cast(), buf.len(), 0) };
        if rc < 0 {
            capture_last_os_error();
            return -1;
        }
        rc as isize
    }

    /// Sends from `buf` under the same sentinel contract as
    /// [`Socket::read`].
    pub fn write(&self, buf: &[u8]) -> isize {
        let rc = unsafe {
            libc::send(
                self.raw_fd(),
                buf.as_ptr().cast(),
                buf.len(),
                no_sigpipe_flags(),
            )
        };
        if rc < 0 {
            capture_last_os_error();
            return -1;
        }
        rc as isize
    }

    /// Pending socket error (SO_ERROR), clearing it; 0 when none.
    pub fn pending_error(&self) -> i32 {
        let mut value: libc::c_int = 0;
        let mut len = size_of::<libc::c_int>() as libc::socklen_t;
        let rc = unsafe {
            libc::getsockopt(
                self.raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                (&raw mut value).cast(),
                &mut len,
            )
        };
        if rc != 0 { -1 } else { value }
    }

    pub fn set_recv_timeout(&self, milliseconds: u32) -> Result<()> {
        self.set_time_option(libc::SO_RCVTIMEO, milliseconds)
    }

    pub fn recv_timeout(&self) -> Result<u32> {
        self.time_option(libc::SO_RCVTIMEO)
    }

    pub fn set_send_timeout(&self, milliseconds: u32) -> Result<()> {
        self.set_time_option(libc::SO_SNDTIMEO, milliseconds)
    }

    pub fn send_timeout(&self) -> Result<u32> {
        self.time_option(libc::SO_SNDTIMEO)
    }

    fn set_time_option(&self, option: libc::c_int, milliseconds: u32) -> Result<()> {
        let tv = libc::timeval {
            tv_sec: (milliseconds / 1000) as libc::time_t,
            tv_usec: ((milliseconds % 1000) * 1000) as libc::suseconds_t,
        };
        let rc = unsafe {
            libc::setsockopt(
                self.raw_fd(),
                libc::SOL_SOCKET,
                option,
                (&raw const tv).cast(),
                size_of::<libc::timeval>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    fn time_option(&self, option: libc::c_int) -> Result<u32> {
        let mut tv = libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        let mut len = size_of::<libc::timeval>() as libc::socklen_t;
        let rc = unsafe {
            libc::getsockopt(
                self.raw_fd(),
                libc::SOL_SOCKET,
                option,
                (&raw mut tv).cast(),
                &mut len,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(tv.tv_sec as u32 * 1000 + tv.tv_usec as u32 / 1000)
    }
}

#[cfg(target_os = "linux")]
fn no_sigpipe_flags() -> libc::c_int {
    libc::MSG_NOSIGNAL
}

#[cfg(not(target_os = "linux"))]
fn no_sigpipe_flags() -> libc::c_int {
    0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
