use bytes::BytesMut;
use tracing::debug;
use vpilink_frame::{FrameWriter, Framing};
use vpilink_message::{Message, ReadReply};
use vpilink_transport::Channel;

use crate::error::Result;

/// Outbound half of a link.
///
/// Each send encodes one message and performs one transport write. A short
/// write fails the call and is not retried.
pub struct Sender {
    writer: FrameWriter<Channel>,
    scratch: BytesMut,
}

impl Sender {
    pub(crate) fn new(writer: FrameWriter<Channel>) -> Self {
        Self {
            writer,
            scratch: BytesMut::new(),
        }
    }

    /// Encode and send any message.
    pub fn send(&mut self, message: &Message) -> Result<()> {
        self.scratch.clear();
        message.encode_payload(&mut self.scratch)?;
        self.writer.send(message.kind().tag(), &self.scratch)?;
        debug!(kind = %message.kind(), len = self.scratch.len(), "message sent");
        Ok(())
    }

    /// Send a frame with an arbitrary type byte and payload, unvalidated.
    ///
    /// For tools and tests that need to put malformed traffic on the wire.
    pub fn send_frame(&mut self, msg_type: u8, payload: &[u8]) -> Result<()> {
        self.writer.send(msg_type, payload)?;
        Ok(())
    }

    /// Send the liveness tick.
    pub fn send_tick(&mut self) -> Result<()> {
        self.send(&Message::Tick)
    }

    /// Answer a read request with up to 255 chunks.
    pub fn send_read_reply(&mut self, chunk_data: &[u8]) -> Result<()> {
        let reply = ReadReply::new(bytes::Bytes::copy_from_slice(chunk_data));
        self.send(&Message::ReadReply(reply))
    }

    pub fn framing(&self) -> Framing {
        self.writer.framing()
    }

    pub(crate) fn channel(&self) -> &Channel {
        self.writer.get_ref()
    }
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("channel", self.writer.get_ref())
            .finish()
    }
}
