use std::net::TcpListener;

use tracing::{debug, info};

use crate::address::Address;
use crate::channel::{Channel, Framing};
use crate::error::{Result, TransportError};

/// Accepts channels on an [`Address`].
///
/// The companion side of the link binds one of these; the host connects.
/// Filesystem sockets are created with mode `0o600`, a stale socket at the
/// path is replaced, and the path is removed on drop as long as it still
/// refers to the socket this listener created.
pub struct Listener {
    inner: ListenerInner,
    address: Address,
    /// Held for its `Drop`, which removes the socket path.
    #[cfg(unix)]
    _socket_file: Option<SocketFile>,
}

enum ListenerInner {
    #[cfg(unix)]
    SeqPacket(crate::seqpacket::SeqPacketListener),
    #[cfg(unix)]
    UnixStream(std::os::unix::net::UnixListener),
    Tcp(TcpListener),
}

impl Listener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    pub fn bind(address: &Address) -> Result<Self> {
        let bind_err = |source| TransportError::Bind {
            address: address.to_string(),
            source,
        };

        let listener = match address {
            #[cfg(unix)]
            Address::SeqPacket(path) => {
                crate::channel::check_path_len(path)?;
                SocketFile::remove_stale(path, address)?;
                let inner = crate::seqpacket::SeqPacketListener::bind(path)?;
                let socket_file = SocketFile::created(path, Self::DEFAULT_SOCKET_MODE, address)?;
                Self {
                    inner: ListenerInner::SeqPacket(inner),
                    address: address.clone(),
                    _socket_file: Some(socket_file),
                }
            }
            #[cfg(unix)]
            Address::UnixStream(path) => {
                crate::channel::check_path_len(path)?;
                SocketFile::remove_stale(path, address)?;
                let inner = std::os::unix::net::UnixListener::bind(path).map_err(bind_err)?;
                let socket_file = SocketFile::created(path, Self::DEFAULT_SOCKET_MODE, address)?;
                Self {
                    inner: ListenerInner::UnixStream(inner),
                    address: address.clone(),
                    _socket_file: Some(socket_file),
                }
            }
            #[cfg(not(unix))]
            Address::SeqPacket(_) | Address::UnixStream(_) => {
                return Err(TransportError::Unsupported("unix socket"));
            }
            Address::Tcp(addr) => {
                let inner = TcpListener::bind(addr.as_str()).map_err(bind_err)?;
                // Resolve port 0 so callers can hand the real address to a peer.
                let local = inner.local_addr().map_err(bind_err)?;
                Self {
                    inner: ListenerInner::Tcp(inner),
                    address: Address::Tcp(local.to_string()),
                    #[cfg(unix)]
                    _socket_file: None,
                }
            }
        };

        info!(address = %listener.address, "listening");
        Ok(listener)
    }

    /// Accept one channel (blocking).
    pub fn accept(&self) -> Result<Channel> {
        let channel = match &self.inner {
            #[cfg(unix)]
            ListenerInner::SeqPacket(l) => Channel::from_seqpacket(l.accept()?),
            #[cfg(unix)]
            ListenerInner::UnixStream(l) => {
                let (stream, _addr) = l.accept().map_err(TransportError::Accept)?;
                Channel::from_unix_stream(stream)
            }
            ListenerInner::Tcp(l) => {
                let (stream, peer) = l.accept().map_err(TransportError::Accept)?;
                stream.set_nodelay(true).map_err(TransportError::Accept)?;
                debug!(%peer, "accepted tcp peer");
                Channel::from_tcp(stream)
            }
        };
        debug!(address = %self.address, "accepted connection");
        Ok(channel)
    }

    /// The bound address. For TCP this carries the resolved port.
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn framing(&self) -> Framing {
        self.address.framing()
    }
}

/// Identity of a socket file this process created.
#[cfg(unix)]
struct SocketFile {
    path: std::path::PathBuf,
    dev: u64,
    ino: u64,
}

#[cfg(unix)]
impl SocketFile {
    /// Remove a leftover socket at `path`, refusing to touch anything else.
    fn remove_stale(path: &std::path::Path, address: &Address) -> Result<()> {
        use std::os::unix::fs::FileTypeExt;

        let bind_err = |source| TransportError::Bind {
            address: address.to_string(),
            source,
        };
        let metadata = match std::fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(bind_err(err)),
        };
        if !metadata.file_type().is_socket() {
            return Err(bind_err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "existing path is not a unix socket",
            )));
        }
        debug!(?path, "removing stale socket");
        std::fs::remove_file(path).map_err(bind_err)
    }

    fn created(path: &std::path::Path, mode: u32, address: &Address) -> Result<Self> {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let bind_err = |source| TransportError::Bind {
            address: address.to_string(),
            source,
        };
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(bind_err)?;
        let metadata = std::fs::symlink_metadata(path).map_err(bind_err)?;
        Ok(Self {
            path: path.to_path_buf(),
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }
}

#[cfg(unix)]
impl Drop for SocketFile {
    fn drop(&mut self) {
        use std::os::unix::fs::{FileTypeExt, MetadataExt};

        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == self.dev
                && metadata.ino() == self.ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
            }
        }
    }
}
