use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::{debug, trace};
use vpilink_transport::{Channel, Framing};

use crate::codec::{decode_packet, decode_prefixed, Frame, FrameConfig};
use crate::error::{FrameError, Result};

/// Reads complete frames from any `Read` source.
///
/// The deframing strategy is fixed at construction:
/// - [`Framing::MessagePreserving`]: one `read` is one frame
/// - [`Framing::LengthPrefixed`]: bytes are accumulated until the length
///   header is satisfied; bytes belonging to the next frame are kept
pub struct FrameReader<T> {
    inner: T,
    framing: Framing,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a frame reader with default configuration.
    pub fn new(inner: T, framing: Framing) -> Self {
        Self::with_config(inner, framing, FrameConfig::default())
    }

    /// Create a frame reader with explicit configuration.
    ///
    /// A `max_frame_len` below [`MIN_MAX_FRAME_LEN`] is raised to it.
    ///
    /// [`MIN_MAX_FRAME_LEN`]: crate::MIN_MAX_FRAME_LEN
    pub fn with_config(inner: T, framing: Framing, config: FrameConfig) -> Self {
        let config = config.clamped();
        Self {
            inner,
            framing,
            buf: BytesMut::with_capacity(config.max_frame_len),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Ok(None)` when the peer shut down in an orderly way, which
    /// is signalled by a zero-byte read at any point, including part way
    /// through a frame on a stream channel.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        match self.framing {
            Framing::MessagePreserving => self.read_packet(),
            Framing::LengthPrefixed => self.read_prefixed(),
        }
    }

    fn read_packet(&mut self) -> Result<Option<Frame>> {
        let mut packet = vec![0u8; self.config.max_frame_len];
        let read = loop {
            match self.inner.read(&mut packet) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        };

        if read == 0 {
            debug!("peer closed channel");
            return Ok(None);
        }
        trace!(len = read, "packet received");
        decode_packet(&packet[..read], self.config.max_frame_len).map(Some)
    }

    fn read_prefixed(&mut self) -> Result<Option<Frame>> {
        let mut chunk = vec![0u8; self.config.max_frame_len];
        loop {
            if let Some(frame) = decode_prefixed(&mut self.buf, self.config.max_frame_len)? {
                return Ok(Some(frame));
            }

            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                debug!(buffered = self.buf.len(), "peer closed channel");
                self.buf.clear();
                return Ok(None);
            }

            trace!(len = read, buffered = self.buf.len(), "stream bytes received");
            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// The framing strategy this reader was built with.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Bytes received past the last returned frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying source.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying source.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner source.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<Channel> {
    /// Create a frame reader for a `Channel`, taking the framing from the
    /// channel and applying the read timeout from config.
    pub fn from_channel(inner: Channel, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        let framing = inner.framing();
        Ok(Self::with_config(inner, framing, config))
    }
}

pub(crate) fn transport_to_frame_error(err: vpilink_transport::TransportError) -> FrameError {
    match err {
        vpilink_transport::TransportError::Io(io)
        | vpilink_transport::TransportError::Accept(io) => FrameError::Io(io),
        vpilink_transport::TransportError::Bind { source, .. }
        | vpilink_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
