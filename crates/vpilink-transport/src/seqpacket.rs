//! `SOCK_SEQPACKET` Unix sockets.
//!
//! std has no seqpacket support, so sockets are created through `libc` and
//! held as [`OwnedFd`] from the moment they exist. A failed connect or bind
//! drops the descriptor on the way out.

use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};

#[cfg(target_os = "linux")]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(target_os = "linux"))]
const SEND_FLAGS: libc::c_int = 0;

const LISTEN_BACKLOG: libc::c_int = 16;

/// A connected message-preserving Unix socket.
///
/// Each `write` sends one packet and each `read` returns at most one packet.
/// A packet longer than the read buffer is truncated by the kernel.
#[derive(Debug)]
pub struct SeqPacketStream {
    fd: OwnedFd,
}

impl SeqPacketStream {
    /// Connect to a listening seqpacket socket.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (addr, len) = socket_addr(path)?;
        let connect_err = |source| TransportError::Connect {
            address: path.display().to_string(),
            source,
        };

        let fd = new_socket().map_err(connect_err)?;
        // SAFETY: `addr` is a fully initialised sockaddr_un and `len` does not exceed its size.
        cvt(unsafe {
            libc::connect(
                fd.as_raw_fd(),
                (&addr as *const libc::sockaddr_un).cast::<libc::sockaddr>(),
                len,
            )
        })
        .map_err(connect_err)?;

        debug!(?path, "connected seqpacket socket");
        Ok(Self { fd })
    }

    /// Create a connected pair (used by tests and in-process links).
    pub fn pair() -> io::Result<(Self, Self)> {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: `fds` has room for the two descriptors socketpair writes.
        cvt(unsafe { libc::socketpair(libc::AF_UNIX, socket_type(), 0, fds.as_mut_ptr()) })?;
        // SAFETY: socketpair succeeded, so both descriptors are open and owned by us.
        let (a, b) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        Ok((Self { fd: a }, Self { fd: b }))
    }

    /// Receive one packet.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
        let n = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
                0,
            )
        };
        cvt_size(n)
    }

    /// Send one packet.
    pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
        // SAFETY: `buf` is valid for reads of `buf.len()` bytes.
        let n = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                buf.as_ptr().cast::<libc::c_void>(),
                buf.len(),
                SEND_FLAGS,
            )
        };
        cvt_size(n)
    }

    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            fd: self.fd.try_clone()?,
        })
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        set_timeout(self.fd.as_fd(), libc::SO_RCVTIMEO, timeout)
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        set_timeout(self.fd.as_fd(), libc::SO_SNDTIMEO, timeout)
    }

    /// Shut down both directions. The peer sees an orderly close.
    pub fn shutdown(&self) -> io::Result<()> {
        // SAFETY: the descriptor is open for the lifetime of `self`.
        cvt(unsafe { libc::shutdown(self.fd.as_raw_fd(), libc::SHUT_RDWR) }).map(|_| ())
    }
}

impl Read for SeqPacketStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv(buf)
    }
}

impl Write for SeqPacketStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsFd for SeqPacketStream {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

/// A listening seqpacket socket. The socket file is not removed here;
/// [`crate::Listener`] handles filesystem cleanup.
#[derive(Debug)]
pub struct SeqPacketListener {
    fd: OwnedFd,
}

impl SeqPacketListener {
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (addr, len) = socket_addr(path)?;
        let bind_err = |source| TransportError::Bind {
            address: path.display().to_string(),
            source,
        };

        let fd = new_socket().map_err(bind_err)?;
        // SAFETY: `addr` is a fully initialised sockaddr_un and `len` does not exceed its size.
        cvt(unsafe {
            libc::bind(
                fd.as_raw_fd(),
                (&addr as *const libc::sockaddr_un).cast::<libc::sockaddr>(),
                len,
            )
        })
        .map_err(bind_err)?;
        // SAFETY: `fd` is a bound socket.
        cvt(unsafe { libc::listen(fd.as_raw_fd(), LISTEN_BACKLOG) }).map_err(bind_err)?;

        Ok(Self { fd })
    }

    /// Accept one connection (blocking). `EINTR` is retried.
    pub fn accept(&self) -> Result<SeqPacketStream> {
        loop {
            // SAFETY: null address pointers are allowed when the peer address is not wanted.
            let raw = unsafe {
                libc::accept(
                    self.fd.as_raw_fd(),
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                )
            };
            if raw >= 0 {
                // SAFETY: accept returned a fresh descriptor that nothing else owns.
                let fd = unsafe { OwnedFd::from_raw_fd(raw) };
                set_cloexec(fd.as_fd()).map_err(TransportError::Accept)?;
                return Ok(SeqPacketStream { fd });
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(TransportError::Accept(err));
            }
        }
    }
}

fn socket_type() -> libc::c_int {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        libc::SOCK_SEQPACKET
    }
}

fn new_socket() -> io::Result<OwnedFd> {
    // SAFETY: plain socket(2) call with constant arguments.
    let raw = unsafe { libc::socket(libc::AF_UNIX, socket_type(), 0) };
    if raw < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: socket returned a fresh descriptor that nothing else owns.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };
    set_cloexec(fd.as_fd())?;
    Ok(fd)
}

fn set_cloexec(fd: BorrowedFd<'_>) -> io::Result<()> {
    // SAFETY: F_SETFD on a descriptor we hold open.
    cvt(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) }).map(|_| ())
}

/// Maximum socket path length, from `sockaddr_un.sun_path`.
pub(crate) fn max_path_len() -> usize {
    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    let addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_path.len()
}

fn socket_addr(path: &Path) -> Result<(libc::sockaddr_un, libc::socklen_t)> {
    let bytes = path.as_os_str().as_bytes();
    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };

    // One byte is kept for the terminating NUL.
    if bytes.len() >= addr.sun_path.len() {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len: bytes.len(),
            max: addr.sun_path.len(),
        });
    }
    if bytes.contains(&0) {
        return Err(TransportError::InvalidAddress {
            address: path.display().to_string(),
            reason: "socket path contains a NUL byte",
        });
    }

    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }

    let base = &addr as *const libc::sockaddr_un as usize;
    let path_offset = addr.sun_path.as_ptr() as usize - base;
    let len = (path_offset + bytes.len() + 1) as libc::socklen_t;
    Ok((addr, len))
}

fn set_timeout(fd: BorrowedFd<'_>, option: libc::c_int, timeout: Option<Duration>) -> io::Result<()> {
    let tv = match timeout {
        Some(d) if d.is_zero() => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot set a 0 duration timeout",
            ));
        }
        Some(d) => libc::timeval {
            tv_sec: d.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
            tv_usec: d.subsec_micros() as libc::suseconds_t,
        },
        None => libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
    };
    // SAFETY: `tv` is a valid timeval and the length matches its size.
    cvt(unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            option,
            (&tv as *const libc::timeval).cast::<libc::c_void>(),
            std::mem::size_of::<libc::timeval>() as libc::socklen_t,
        )
    })
    .map(|_| ())
}

fn cvt(rc: libc::c_int) -> io::Result<libc::c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

fn cvt_size(rc: libc::ssize_t) -> io::Result<usize> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}
