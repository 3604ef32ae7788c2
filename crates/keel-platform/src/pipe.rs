//! Named pipes.
//!
//! A pipe name maps to a socket path in the scratch directory; the
//! server owns the listening endpoint, accepts one client at a time, and
//! supports a non-consuming peek. Peeking leaves the pipe contents
//! intact; a subsequent read returns the same bytes.

use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use keel_core::text::wide_to_string;

use crate::error::{PlatformError, Result};
use crate::os;

const CONNECT_POLL_MILLIS: u64 = 10;

/// Filesystem endpoint for a pipe name; non-portable name characters are
/// flattened so classic `\\.\pipe\name` spellings work unchanged.
fn pipe_path(name: &str) -> PathBuf {
    let flat: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    std::env::temp_dir().join(format!("keel-pipe-{flat}"))
}

fn apply_buffer_sizes(stream: &UnixStream, out_buffer: usize, in_buffer: usize) {
    // Buffer sizing is advisory; the OS clamps to its own limits.
    let fd = stream.as_raw_fd();
    if out_buffer > 0 {
        let size = out_buffer as libc::c_int;
        unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_SNDBUF,
                (&raw const size).cast(),
                size_of::<libc::c_int>() as libc::socklen_t,
            );
        }
    }
    if in_buffer > 0 {
        let size = in_buffer as libc::c_int;
        unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_RCVBUF,
                (&raw const size).cast(),
                size_of::<libc::c_int>() as libc::socklen_t,
            );
        }
    }
}

/// Non-consuming peek result.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipePeek {
    /// Bytes copied into the caller's buffer.
    pub bytes_read: usize,
    /// Total bytes currently buffered in the pipe.
    pub bytes_available: usize,
}

fn peek_stream(stream: &UnixStream, buf: &mut [u8]) -> Result<PipePeek> {
    let fd = stream.as_raw_fd();
    let bytes_read = if buf.is_empty() {
        0
    } else {
        os::socket_peek(fd, buf)?
    };
    let bytes_available = os::bytes_available(fd)?;
    Ok(PipePeek {
        bytes_read,
        bytes_available,
    })
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Server end of a named pipe.
pub struct PipeServer {
    listener: UnixListener,
    stream: Option<UnixStream>,
    path: PathBuf,
    out_buffer: usize,
    in_buffer: usize,
    default_timeout_ms: u32,
}

impl PipeServer {
    /// Creates the pipe endpoint. Buffer sizes are advisory; the timeout
    /// applies to [`PipeServer::connect`] calls.
    pub fn create(
        name: &str,
        out_buffer: usize,
        in_buffer: usize,
        default_timeout_ms: u32,
    ) -> Result<Self> {
        let path = pipe_path(name);
        // A stale endpoint from a dead server would make bind fail.
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).map_err(PlatformError::from)?;
        listener.set_nonblocking(true).map_err(PlatformError::from)?;
        Ok(Self {
            listener,
            stream: None,
            path,
            out_buffer,
            in_buffer,
            default_timeout_ms,
        })
    }

    /// Wide-string variant of [`PipeServer::create`].
    pub fn create_wide(
        name: &[u16],
        out_buffer: usize,
        in_buffer: usize,
        default_timeout_ms: u32,
    ) -> Result<Self> {
        Self::create(&wide_to_string(name), out_buffer, in_buffer, default_timeout_ms)
    }

    /// Waits for one client to connect, up to the default timeout.
    pub fn connect(&mut self) -> Result<()> {
        let deadline =
            Instant::now() + Duration::from_millis(u64::from(self.default_timeout_ms));
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    apply_buffer_sizes(&stream, self.out_buffer, self.in_buffer);
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(PlatformError::Timeout);
                    }
                    std::thread::sleep(Duration::from_millis(CONNECT_POLL_MILLIS));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Drops the current client; the endpoint stays open for the next
    /// [`PipeServer::connect`].
    pub fn disconnect(&mut self) {
        self.stream = None;
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn connected(&self) -> Result<&UnixStream> {
        self.stream
            .as_ref()
            .ok_or(PlatformError::Invalid("pipe has no connected client"))
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut stream = self.connected()?;
        stream.read(buf).map_err(PlatformError::from)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut stream = self.connected()?;
        stream.write(buf).map_err(PlatformError::from)
    }

    /// Copies buffered data without removing it from the pipe.
    pub fn peek(&self, buf: &mut [u8]) -> Result<PipePeek> {
        peek_stream(self.connected()?, buf)
    }
}

impl Drop for PipeServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client end of a named pipe.
pub struct PipeClient {
    stream: UnixStream,
}

impl PipeClient {
    /// Connects to a pipe by name, retrying until `timeout_ms` elapses
    /// (covers the window before the server endpoint exists).
    pub fn open(name: &str, timeout_ms: u32) -> Result<Self> {
        let path = pipe_path(name);
        let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
        loop {
            match UnixStream::connect(&path) {
                Ok(stream) => return Ok(Self { stream }),
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(CONNECT_POLL_MILLIS));
                }
                Err(err) => {
                    return match err.kind() {
                        std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                            Err(PlatformError::Timeout)
                        }
                        _ => Err(err.into()),
                    };
                }
            }
        }
    }

    /// Wide-string variant of [`PipeClient::open`].
    pub fn open_wide(name: &[u16], timeout_ms: u32) -> Result<Self> {
        Self::open(&wide_to_string(name), timeout_ms)
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read(buf).map_err(PlatformError::from)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(PlatformError::from)
    }

    /// Copies buffered data without removing it from the pipe.
    pub fn peek(&self, buf: &mut [u8]) -> Result<PipePeek> {
        peek_stream(&self.stream, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("keel-test-{}-{}", tag, std::process::id())
    }

    #[test]
    fn connect_times_out_without_a_client() {
        let name = unique_name("lonely");
        let mut server = PipeServer::create(&name, 4096, 4096, 50).unwrap();
        assert!(matches!(server.connect(), Err(PlatformError::Timeout)));
    }

    #[test]
    fn client_open_times_out_without_a_server() {
        let err = PipeClient::open(&unique_name("absent"), 50);
        assert!(matches!(err, Err(PlatformError::Timeout)));
    }

    #[test]
    fn round_trip_and_nonconsuming_peek() {
        let name = unique_name("peek");
        let mut server = PipeServer::create(&name, 4096, 4096, 2000).unwrap();

        let client_name = name.clone();
        let client = std::thread::spawn(move || {
            let mut client = PipeClient::open(&client_name, 2000).unwrap();
            client.write(b"ping!").unwrap();
            let mut reply = [0u8; 5];
            assert_eq!(client.read(&mut reply).unwrap(), 5);
            assert_eq!(&reply, b"pong!");
        });

        server.connect().unwrap();

        // Wait for the payload to arrive, then peek it twice.
        let mut waited = 0;
        while server.peek(&mut []).unwrap().bytes_available < 5 {
            std::thread::sleep(Duration::from_millis(5));
            waited += 1;
            assert!(waited < 400, "payload never arrived");
        }
        let mut peek_buf = [0u8; 5];
        let first = server.peek(&mut peek_buf).unwrap();
        assert_eq!(first.bytes_read, 5);
        assert_eq!(first.bytes_available, 5);
        assert_eq!(&peek_buf, b"ping!");

        // Peek again: contents are intact.
        let mut peek_again = [0u8; 5];
        server.peek(&mut peek_again).unwrap();
        assert_eq!(&peek_again, b"ping!");

        // And a real read still sees the same bytes.
        let mut buf = [0u8; 5];
        assert_eq!(server.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"ping!");
        assert_eq!(server.peek(&mut []).unwrap().bytes_available, 0);

        server.write(b"pong!").unwrap();
        client.join().unwrap();

        server.disconnect();
        assert!(!server.is_connected());
        assert!(server.read(&mut buf).is_err());
    }
}
