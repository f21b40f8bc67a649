//! The companion end of the link.
//!
//! The companion process listens; the host connects to it. This endpoint
//! lets tools and tests play the companion: issue `Go`, `Write` and `Read`
//! requests and receive the host's ticks and read replies.

use bytes::Bytes;
use tracing::debug;
use vpilink_frame::{FrameConfig, FrameReader, FrameWriter, Framing};
use vpilink_message::{Message, ReadRequest, WriteRequest};
use vpilink_transport::{Address, Channel, Listener};

use crate::error::Result;
use crate::sender::Sender;

/// Listens for the host to connect.
pub struct CompanionListener {
    listener: Listener,
    config: FrameConfig,
}

impl CompanionListener {
    pub fn bind(address: &Address) -> Result<Self> {
        Self::bind_with_config(address, FrameConfig::default())
    }

    pub fn bind_with_config(address: &Address, config: FrameConfig) -> Result<Self> {
        Ok(Self {
            listener: Listener::bind(address)?,
            config,
        })
    }

    /// Accept the host's connection (blocking).
    pub fn accept(&self) -> Result<Companion> {
        let channel = self.listener.accept()?;
        Companion::from_channel(channel, self.config.clone())
    }

    /// Bound address; for TCP this carries the resolved port.
    pub fn address(&self) -> &Address {
        self.listener.address()
    }
}

/// A connected companion endpoint.
pub struct Companion {
    reader: FrameReader<Channel>,
    sender: Sender,
}

impl Companion {
    pub fn from_channel(channel: Channel, config: FrameConfig) -> Result<Self> {
        let reader_channel = channel.try_clone()?;
        let reader = FrameReader::from_channel(reader_channel, config.clone())?;
        let writer = FrameWriter::from_channel(channel, config)?;
        Ok(Self {
            reader,
            sender: Sender::new(writer),
        })
    }

    /// Ask the host to advance the simulation.
    pub fn send_go(&mut self) -> Result<()> {
        self.sender.send(&Message::Go)
    }

    pub fn send_write(&mut self, name: &str, chunk_index: u32, chunk_data: &[u8]) -> Result<()> {
        let write = WriteRequest::new(name, chunk_index, Bytes::copy_from_slice(chunk_data));
        self.sender.send(&Message::Write(write))
    }

    pub fn send_read(&mut self, name: &str, index: u32) -> Result<()> {
        self.sender.send(&Message::Read(ReadRequest::new(name, index)))
    }

    /// Receive the next message from the host (blocking).
    ///
    /// Returns `Ok(None)` once the host has closed the link. Messages are
    /// returned whatever their kind; a well-behaved host only sends ticks
    /// and read replies.
    pub fn recv(&mut self) -> Result<Option<Message>> {
        let Some(frame) = self.reader.read_frame()? else {
            debug!("host closed the link");
            return Ok(None);
        };
        let message = Message::decode(frame.msg_type, frame.payload)?;
        debug!(kind = %message.kind(), "message received");
        Ok(Some(message))
    }

    /// The outbound half.
    pub fn sender(&mut self) -> &mut Sender {
        &mut self.sender
    }

    pub fn framing(&self) -> Framing {
        self.reader.framing()
    }

    /// Shut the channel down.
    pub fn close(self) {
        self.sender.channel().shutdown();
    }
}
