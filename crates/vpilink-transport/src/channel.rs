use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use tracing::debug;

use crate::address::Address;
use crate::error::{Result, TransportError};

/// How message boundaries are carried by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// The transport delimits messages itself: one send is one receive.
    MessagePreserving,
    /// The transport is a byte stream: every frame carries a length header.
    LengthPrefixed,
}

impl Framing {
    pub fn as_str(self) -> &'static str {
        match self {
            Framing::MessagePreserving => "message-preserving",
            Framing::LengthPrefixed => "length-prefixed",
        }
    }
}

/// A connected point-to-point channel. Implements `Read + Write`.
///
/// On a message-preserving channel each `read` returns one whole message and
/// each `write` sends one. On a stream channel both are plain byte I/O.
pub struct Channel {
    inner: ChannelInner,
}

enum ChannelInner {
    #[cfg(unix)]
    SeqPacket(crate::seqpacket::SeqPacketStream),
    #[cfg(unix)]
    UnixStream(std::os::unix::net::UnixStream),
    Tcp(TcpStream),
}

impl Channel {
    /// Open a channel to `address`.
    pub fn connect(address: &Address) -> Result<Self> {
        let connect_err = |source| TransportError::Connect {
            address: address.to_string(),
            source,
        };

        let inner = match address {
            #[cfg(unix)]
            Address::SeqPacket(path) => {
                ChannelInner::SeqPacket(crate::seqpacket::SeqPacketStream::connect(path)?)
            }
            #[cfg(unix)]
            Address::UnixStream(path) => {
                check_path_len(path)?;
                ChannelInner::UnixStream(
                    std::os::unix::net::UnixStream::connect(path).map_err(connect_err)?,
                )
            }
            #[cfg(not(unix))]
            Address::SeqPacket(_) | Address::UnixStream(_) => {
                return Err(TransportError::Unsupported("unix socket"));
            }
            Address::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str()).map_err(connect_err)?;
                stream.set_nodelay(true).map_err(connect_err)?;
                ChannelInner::Tcp(stream)
            }
        };

        let channel = Self { inner };
        debug!(%address, framing = channel.framing().as_str(), "channel connected");
        Ok(channel)
    }

    #[cfg(unix)]
    pub fn from_seqpacket(stream: crate::seqpacket::SeqPacketStream) -> Self {
        Self {
            inner: ChannelInner::SeqPacket(stream),
        }
    }

    #[cfg(unix)]
    pub fn from_unix_stream(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: ChannelInner::UnixStream(stream),
        }
    }

    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: ChannelInner::Tcp(stream),
        }
    }

    /// Whether this channel preserves message boundaries.
    pub fn framing(&self) -> Framing {
        match &self.inner {
            #[cfg(unix)]
            ChannelInner::SeqPacket(_) => Framing::MessagePreserving,
            #[cfg(unix)]
            ChannelInner::UnixStream(_) => Framing::LengthPrefixed,
            ChannelInner::Tcp(_) => Framing::LengthPrefixed,
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            ChannelInner::SeqPacket(_) => "unix-seqpacket",
            #[cfg(unix)]
            ChannelInner::UnixStream(_) => "unix-stream",
            ChannelInner::Tcp(_) => "tcp",
        }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            ChannelInner::SeqPacket(s) => s.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            ChannelInner::UnixStream(s) => s.set_read_timeout(timeout).map_err(Into::into),
            ChannelInner::Tcp(s) => s.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            ChannelInner::SeqPacket(s) => s.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            ChannelInner::UnixStream(s) => s.set_write_timeout(timeout).map_err(Into::into),
            ChannelInner::Tcp(s) => s.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Duplicate the handle so reading and writing can be owned separately.
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            #[cfg(unix)]
            ChannelInner::SeqPacket(s) => ChannelInner::SeqPacket(s.try_clone()?),
            #[cfg(unix)]
            ChannelInner::UnixStream(s) => ChannelInner::UnixStream(s.try_clone()?),
            ChannelInner::Tcp(s) => ChannelInner::Tcp(s.try_clone()?),
        };
        Ok(Self { inner })
    }

    /// Shut down both directions. Errors (typically `NotConnected` when
    /// the peer already left) are not actionable and are only logged.
    pub fn shutdown(&self) {
        let result = match &self.inner {
            #[cfg(unix)]
            ChannelInner::SeqPacket(s) => s.shutdown(),
            #[cfg(unix)]
            ChannelInner::UnixStream(s) => s.shutdown(Shutdown::Both),
            ChannelInner::Tcp(s) => s.shutdown(Shutdown::Both),
        };
        if let Err(err) = result {
            debug!(%err, "channel shutdown reported an error");
        }
    }
}

impl Read for Channel {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            ChannelInner::SeqPacket(s) => s.read(buf),
            #[cfg(unix)]
            ChannelInner::UnixStream(s) => s.read(buf),
            ChannelInner::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Channel {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            ChannelInner::SeqPacket(s) => s.write(buf),
            #[cfg(unix)]
            ChannelInner::UnixStream(s) => s.write(buf),
            ChannelInner::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            ChannelInner::SeqPacket(s) => s.flush(),
            #[cfg(unix)]
            ChannelInner::UnixStream(s) => s.flush(),
            ChannelInner::Tcp(s) => s.flush(),
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("type", &self.transport_name())
            .field("framing", &self.framing())
            .finish()
    }
}

#[cfg(unix)]
pub(crate) fn check_path_len(path: &std::path::Path) -> Result<()> {
    let len = path.as_os_str().len();
    let max = crate::seqpacket::max_path_len();
    if len >= max {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max,
        });
    }
    Ok(())
}
