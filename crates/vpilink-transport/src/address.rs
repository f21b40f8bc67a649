use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::channel::Framing;
use crate::error::TransportError;

/// Where a channel lives.
///
/// Accepted forms:
/// - `tcp://HOST:PORT` or bare `HOST:PORT` for a TCP byte stream
/// - `unix-stream:PATH` for a Unix stream socket
/// - `seqpacket:PATH` or any other string for a `SOCK_SEQPACKET` Unix socket path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Message-preserving Unix socket at a filesystem path.
    SeqPacket(PathBuf),
    /// Unix stream socket at a filesystem path.
    UnixStream(PathBuf),
    /// TCP `host:port` pair.
    Tcp(String),
}

impl Address {
    /// Framing the channel at this address will need.
    pub fn framing(&self) -> Framing {
        match self {
            Address::SeqPacket(_) => Framing::MessagePreserving,
            Address::UnixStream(_) | Address::Tcp(_) => Framing::LengthPrefixed,
        }
    }

    /// Filesystem path for Unix socket addresses.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Address::SeqPacket(path) | Address::UnixStream(path) => Some(path),
            Address::Tcp(_) => None,
        }
    }
}

impl FromStr for Address {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| TransportError::InvalidAddress {
            address: s.to_string(),
            reason,
        };

        if s.is_empty() {
            return Err(invalid("address is empty"));
        }

        if let Some(rest) = s.strip_prefix("tcp://") {
            return if is_host_port(rest) {
                Ok(Address::Tcp(rest.to_string()))
            } else {
                Err(invalid("expected host:port after tcp://"))
            };
        }
        if let Some(rest) = s.strip_prefix("unix-stream:") {
            return non_empty_path(rest)
                .map(Address::UnixStream)
                .ok_or_else(|| invalid("socket path is empty"));
        }
        if let Some(rest) = s.strip_prefix("seqpacket:") {
            return non_empty_path(rest)
                .map(Address::SeqPacket)
                .ok_or_else(|| invalid("socket path is empty"));
        }
        if !s.contains('/') && is_host_port(s) {
            return Ok(Address::Tcp(s.to_string()));
        }
        Ok(Address::SeqPacket(PathBuf::from(s)))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::SeqPacket(path) => {
                let bare = path.display().to_string();
                if parses_as_other_form(&bare) {
                    write!(f, "seqpacket:{bare}")
                } else {
                    f.write_str(&bare)
                }
            }
            Address::UnixStream(path) => write!(f, "unix-stream:{}", path.display()),
            Address::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

/// Whether a bare path string would be read back as something other than a
/// seqpacket path.
fn parses_as_other_form(s: &str) -> bool {
    ["tcp://", "unix-stream:", "seqpacket:"]
        .iter()
        .any(|prefix| s.starts_with(prefix))
        || (!s.contains('/') && is_host_port(s))
}

fn is_host_port(s: &str) -> bool {
    match s.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

fn non_empty_path(s: &str) -> Option<PathBuf> {
    (!s.is_empty()).then(|| PathBuf::from(s))
}
