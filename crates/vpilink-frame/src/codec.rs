use bytes::{Buf, BufMut, Bytes, BytesMut};
use vpilink_transport::Framing;

use crate::error::{FrameError, Result};

/// Upper bound on a frame, framing bytes included. Frames must stay strictly
/// below it.
pub const MAX_FRAME_LEN: usize = 2048;

/// Size of the length header on stream channels.
pub const LENGTH_HEADER_LEN: usize = 2;

/// Smallest valid length header: the header plus a message-type byte.
const MIN_PREFIXED_LEN: usize = LENGTH_HEADER_LEN + 1;

/// Smallest usable `max_frame_len`. Below it no frame fits and a packet read
/// into the empty buffer would look like a closed channel.
pub const MIN_MAX_FRAME_LEN: usize = MIN_PREFIXED_LEN + 1;

/// One deframed message: the type byte and the payload after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: u8,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(msg_type: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type,
            payload: payload.into(),
        }
    }

    /// Size of this frame on the wire under `framing`.
    pub fn wire_size(&self, framing: Framing) -> usize {
        header_len(framing) + 1 + self.payload.len()
    }
}

fn header_len(framing: Framing) -> usize {
    match framing {
        Framing::MessagePreserving => 0,
        Framing::LengthPrefixed => LENGTH_HEADER_LEN,
    }
}

/// Encode a frame into the wire format for `framing`.
///
/// ```text
/// message-preserving:  [type][payload...]
/// length-prefixed:     [len u16 LE][type][payload...]   len = 2 + 1 + payload
/// ```
pub fn encode_frame(
    framing: Framing,
    msg_type: u8,
    payload: &[u8],
    max_frame_len: usize,
    dst: &mut BytesMut,
) -> Result<()> {
    let total = header_len(framing) + 1 + payload.len();
    if total >= max_frame_len {
        return Err(FrameError::FrameTooLarge {
            size: total,
            max: max_frame_len,
        });
    }

    dst.reserve(total);
    if framing == Framing::LengthPrefixed {
        // total < max_frame_len, and callers never configure more than u16 can hold.
        let len = u16::try_from(total).map_err(|_| FrameError::FrameTooLarge {
            size: total,
            max: u16::MAX as usize,
        })?;
        dst.put_u16_le(len);
    }
    dst.put_u8(msg_type);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one packet received from a message-preserving channel.
///
/// `packet` must be exactly what one receive returned. A packet that filled
/// the whole receive buffer may have been truncated and is rejected.
pub fn decode_packet(packet: &[u8], max_frame_len: usize) -> Result<Frame> {
    if packet.len() >= max_frame_len {
        return Err(FrameError::FrameTooLarge {
            size: packet.len(),
            max: max_frame_len,
        });
    }
    let (&msg_type, payload) = packet.split_first().ok_or(FrameError::EmptyFrame)?;
    Ok(Frame {
        msg_type,
        payload: Bytes::copy_from_slice(payload),
    })
}

/// Decode one length-prefixed frame from an accumulation buffer.
///
/// Returns `Ok(None)` until the buffer holds a complete frame. The length
/// header is validated as soon as it is available, before waiting for the
/// rest of the frame. On success the frame's bytes are consumed and anything
/// after it stays in `src`.
pub fn decode_prefixed(src: &mut BytesMut, max_frame_len: usize) -> Result<Option<Frame>> {
    if src.len() < LENGTH_HEADER_LEN {
        return Ok(None);
    }

    let declared = u16::from_le_bytes([src[0], src[1]]) as usize;
    if declared >= max_frame_len {
        return Err(FrameError::FrameTooLarge {
            size: declared,
            max: max_frame_len,
        });
    }
    if declared < MIN_PREFIXED_LEN {
        return Err(FrameError::InvalidLength { declared });
    }
    if src.len() < declared {
        return Ok(None);
    }

    src.advance(LENGTH_HEADER_LEN);
    let msg_type = src.get_u8();
    let payload = src.split_to(declared - MIN_PREFIXED_LEN).freeze();
    Ok(Some(Frame { msg_type, payload }))
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Exclusive upper bound on a frame, framing bytes included. Default: 2048.
    pub max_frame_len: usize,
    /// Read timeout for blocking operations. Default: none.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations. Default: none.
    pub write_timeout: Option<std::time::Duration>,
}

impl FrameConfig {
    /// Raise `max_frame_len` to [`MIN_MAX_FRAME_LEN`] if it is smaller.
    pub fn clamped(mut self) -> Self {
        self.max_frame_len = self.max_frame_len.max(MIN_MAX_FRAME_LEN);
        self
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_len: MAX_FRAME_LEN,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
