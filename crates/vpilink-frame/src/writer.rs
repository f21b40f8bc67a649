use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;
use vpilink_transport::{Channel, Framing};

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

/// Writes complete frames to any `Write` sink.
///
/// Every frame goes out in exactly one `write` call. If the sink accepts
/// fewer bytes than the frame, the send fails with
/// [`FrameError::ShortWrite`]; the rest is not retried.
pub struct FrameWriter<T> {
    inner: T,
    framing: Framing,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a frame writer with default configuration.
    pub fn new(inner: T, framing: Framing) -> Self {
        Self::with_config(inner, framing, FrameConfig::default())
    }

    /// Create a frame writer with explicit configuration.
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

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.msg_type, frame.payload.as_ref())
    }

    /// Encode and send one frame.
    pub fn send(&mut self, msg_type: u8, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_frame(
            self.framing,
            msg_type,
            payload,
            self.config.max_frame_len,
            &mut self.buf,
        )?;

        let expected = self.buf.len();
        let written = loop {
            match self.inner.write(&self.buf) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        };
        if written != expected {
            return Err(FrameError::ShortWrite { written, expected });
        }
        trace!(msg_type, len = expected, "frame sent");

        self.flush()
    }

    /// Flush the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// The framing strategy this writer was built with.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying sink.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner sink.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<Channel> {
    /// Create a frame writer for a `Channel`, taking the framing from the
    /// channel and applying the write timeout from config.
    pub fn from_channel(inner: Channel, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(crate::reader::transport_to_frame_error)?;
        let framing = inner.framing();
        Ok(Self::with_config(inner, framing, config))
    }
}
