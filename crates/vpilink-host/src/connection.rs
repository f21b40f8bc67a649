use tracing::{debug, info, warn};
use vpilink_frame::{FrameConfig, FrameReader, FrameWriter, Framing};
use vpilink_message::Message;
use vpilink_transport::{Address, Channel};

use crate::error::{HostError, Result};
use crate::handler::{Handler, Outcome};
use crate::sender::Sender;

/// The host's link to its companion.
///
/// Owns the channel (split into a frame reader and a [`Sender`]) and the
/// handler. Dropping the connection releases the channel; [`close`]
/// additionally shuts it down and hands the handler back.
///
/// [`close`]: Connection::close
pub struct Connection<H> {
    reader: FrameReader<Channel>,
    sender: Sender,
    handler: H,
}

/// Totals from [`Connection::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Requests dispatched to the handler.
    pub handled: u64,
    /// Whether the loop ended because the companion closed the link.
    pub shutdown: bool,
}

impl<H: Handler> Connection<H> {
    /// Connect to a companion with default configuration.
    pub fn connect(address: &Address, handler: H) -> Result<Self> {
        Self::connect_with_config(address, handler, FrameConfig::default())
    }

    /// Connect with explicit frame configuration (limits and timeouts).
    ///
    /// Either a complete connection is returned or every handle opened
    /// along the way is released.
    pub fn connect_with_config(address: &Address, handler: H, config: FrameConfig) -> Result<Self> {
        let channel = Channel::connect(address)?;
        let connection = Self::from_channel(channel, handler, config)?;
        info!(%address, framing = connection.framing().as_str(), "connected to companion");
        Ok(connection)
    }

    /// Wrap an already connected channel.
    pub fn from_channel(channel: Channel, handler: H, config: FrameConfig) -> Result<Self> {
        let reader_channel = channel.try_clone()?;
        let reader = FrameReader::from_channel(reader_channel, config.clone())?;
        let writer = FrameWriter::from_channel(channel, config)?;
        Ok(Self {
            reader,
            sender: Sender::new(writer),
            handler,
        })
    }

    /// Receive one frame and dispatch it to the handler (blocking).
    ///
    /// Returns the handler's status unchanged, or [`Outcome::Shutdown`] when
    /// the companion closed the link. Framing and decoding failures are
    /// errors and never reach the handler. After a decoding failure (for
    /// example an unknown type byte) the connection can keep receiving;
    /// after a framing failure on a stream channel it should be closed.
    pub fn receive_and_dispatch(&mut self) -> Result<Outcome> {
        let frame = match self.reader.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("companion closed the link");
                return Ok(Outcome::Shutdown);
            }
            Err(err) => {
                warn!(%err, "failed to read frame");
                return Err(err.into());
            }
        };

        let msg_type = frame.msg_type;
        let message = Message::decode(msg_type, frame.payload).map_err(|err| {
            warn!(%err, msg_type, "rejected message");
            HostError::from(err)
        })?;

        let status = match &message {
            Message::Go => self.handler.on_advance(&mut self.sender),
            Message::Write(write) => self.handler.on_write(write, &mut self.sender),
            Message::Read(read) => self.handler.on_read(read, &mut self.sender),
            Message::Tick | Message::ReadReply(_) => {
                warn!(kind = %message.kind(), "message not accepted by the host");
                return Err(HostError::UnexpectedMessage(message.kind()));
            }
        };
        debug!(kind = %message.kind(), status, "message dispatched");
        Ok(Outcome::Handled(status))
    }

    /// Dispatch until the companion shuts down, `keep_running` returns
    /// false, or an error occurs. `keep_running` is checked before each
    /// receive; a receive that is already blocked is not interrupted.
    pub fn run(&mut self, mut keep_running: impl FnMut(&mut H) -> bool) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        while keep_running(&mut self.handler) {
            match self.receive_and_dispatch()? {
                Outcome::Handled(_) => summary.handled += 1,
                Outcome::Shutdown => {
                    summary.shutdown = true;
                    break;
                }
            }
        }
        info!(handled = summary.handled, shutdown = summary.shutdown, "dispatch loop finished");
        Ok(summary)
    }
}

impl<H> Connection<H> {
    /// Send the liveness tick.
    pub fn send_tick(&mut self) -> Result<()> {
        self.sender.send_tick()
    }

    /// Answer a read request with up to 255 chunks.
    pub fn send_read_reply(&mut self, chunk_data: &[u8]) -> Result<()> {
        self.sender.send_read_reply(chunk_data)
    }

    /// The outbound half, for sending outside a handler callback.
    pub fn sender(&mut self) -> &mut Sender {
        &mut self.sender
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn framing(&self) -> Framing {
        self.reader.framing()
    }

    /// Shut the channel down and return the handler.
    ///
    /// Shutdown errors are not reported; the handles are released either way.
    pub fn close(self) -> H {
        let Connection {
            reader,
            sender,
            handler,
        } = self;
        sender.channel().shutdown();
        drop(reader);
        drop(sender);
        debug!("connection closed");
        handler
    }
}

impl<H> std::fmt::Debug for Connection<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("framing", &self.framing())
            .field("sender", &self.sender)
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write;

    use vpilink_frame::FrameError;
    use vpilink_message::{MessageError, MessageKind, ReadRequest, WriteRequest};
    use vpilink_transport::SeqPacketStream;

    use super::*;
    use crate::companion::Companion;
    use crate::handler::Status;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Advance,
        Write(String, u32, usize, Vec<u8>),
        Read(String, u32),
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
        status: Status,
        reply: Option<Vec<u8>>,
    }

    impl Handler for Recorder {
        fn on_advance(&mut self, _link: &mut Sender) -> Status {
            self.events.push(Event::Advance);
            self.status
        }

        fn on_write(&mut self, write: &WriteRequest, _link: &mut Sender) -> Status {
            self.events.push(Event::Write(
                write.name.clone(),
                write.chunk_index,
                write.chunk_count(),
                write.chunk_data.to_vec(),
            ));
            self.status
        }

        fn on_read(&mut self, read: &ReadRequest, link: &mut Sender) -> Status {
            self.events.push(Event::Read(read.name.clone(), read.index));
            if let Some(reply) = &self.reply {
                if link.send_read_reply(reply).is_err() {
                    return 0;
                }
            }
            self.status
        }
    }

    fn seqpacket_link(handler: Recorder) -> (Connection<Recorder>, Companion) {
        let (host, companion) = SeqPacketStream::pair().unwrap();
        let connection = Connection::from_channel(
            Channel::from_seqpacket(host),
            handler,
            FrameConfig::default(),
        )
        .unwrap();
        let companion =
            Companion::from_channel(Channel::from_seqpacket(companion), FrameConfig::default())
                .unwrap();
        (connection, companion)
    }

    fn stream_link(handler: Recorder) -> (Connection<Recorder>, Companion) {
        let (host, companion) = std::os::unix::net::UnixStream::pair().unwrap();
        let connection = Connection::from_channel(
            Channel::from_unix_stream(host),
            handler,
            FrameConfig::default(),
        )
        .unwrap();
        let companion =
            Companion::from_channel(Channel::from_unix_stream(companion), FrameConfig::default())
                .unwrap();
        (connection, companion)
    }

    #[test]
    fn write_reaches_handler_with_exact_fields() {
        for (mut host, mut companion) in [
            seqpacket_link(Recorder::default()),
            stream_link(Recorder::default()),
        ] {
            host.handler_mut().status = 1;
            companion.send_write("sig_a", 3, &[0x01, 0x02]).unwrap();

            assert_eq!(host.receive_and_dispatch().unwrap(), Outcome::Handled(1));
            assert_eq!(
                host.handler().events,
                vec![Event::Write("sig_a".to_string(), 3, 2, vec![1, 2])]
            );
        }
    }

    #[test]
    fn read_then_reply_matches_wire_layout() {
        let handler = Recorder {
            status: 1,
            ..Recorder::default()
        };
        let (host, companion) = SeqPacketStream::pair().unwrap();
        let mut host = Connection::from_channel(
            Channel::from_seqpacket(host),
            handler,
            FrameConfig::default(),
        )
        .unwrap();
        let mut raw_companion = Channel::from_seqpacket(companion);

        raw_companion.write_all(b"\x03sig_b\0\x07\0\0\0").unwrap();
        assert_eq!(host.receive_and_dispatch().unwrap(), Outcome::Handled(1));
        assert_eq!(host.handler().events, vec![Event::Read("sig_b".to_string(), 7)]);

        host.send_read_reply(&[0x42]).unwrap();
        let mut buf = [0u8; 16];
        let n = std::io::Read::read(&mut raw_companion, &mut buf).unwrap();
        assert_eq!(&buf[..n], &[4, 1, 0x42]);
    }

    #[test]
    fn reply_from_inside_handler_on_stream() {
        let handler = Recorder {
            status: 1,
            reply: Some(vec![0x42]),
            ..Recorder::default()
        };
        let (host, companion) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut host = Connection::from_channel(
            Channel::from_unix_stream(host),
            handler,
            FrameConfig::default(),
        )
        .unwrap();
        let mut raw_companion = companion;

        raw_companion.write_all(b"\x0D\x00\x03sig_b\0\x07\0\0\0").unwrap();
        assert_eq!(host.receive_and_dispatch().unwrap(), Outcome::Handled(1));

        let mut buf = [0u8; 5];
        std::io::Read::read_exact(&mut raw_companion, &mut buf).unwrap();
        assert_eq!(buf, [5, 0, 4, 1, 0x42]);
    }

    #[test]
    fn handler_status_passes_through_verbatim() {
        let (mut host, mut companion) = seqpacket_link(Recorder::default());
        for status in [0, 1, -7, i32::MAX] {
            host.handler_mut().status = status;
            companion.send_go().unwrap();
            assert_eq!(host.receive_and_dispatch().unwrap(), Outcome::Handled(status));
        }
        assert_eq!(host.handler().events.len(), 4);
    }

    #[test]
    fn peer_close_is_shutdown_without_dispatch() {
        for (mut host, companion) in [
            seqpacket_link(Recorder::default()),
            stream_link(Recorder::default()),
        ] {
            drop(companion);
            assert_eq!(host.receive_and_dispatch().unwrap(), Outcome::Shutdown);
            assert!(host.handler().events.is_empty());
        }
    }

    #[test]
    fn go_with_payload_never_advances() {
        let (mut host, mut companion) = seqpacket_link(Recorder::default());
        companion.sender().send_frame(1, &[0]).unwrap();

        let err = host.receive_and_dispatch().unwrap_err();
        assert!(matches!(
            err,
            HostError::Message(MessageError::UnexpectedPayload {
                kind: MessageKind::Go,
                len: 1
            })
        ));
        assert!(host.handler().events.is_empty());
    }

    #[test]
    fn unknown_type_leaves_connection_usable() {
        let (mut host, mut companion) = stream_link(Recorder::default());
        companion.sender().send_frame(9, &[]).unwrap();
        companion.send_go().unwrap();

        let err = host.receive_and_dispatch().unwrap_err();
        assert!(matches!(err, HostError::Message(MessageError::UnknownType(9))));
        assert_eq!(host.receive_and_dispatch().unwrap(), Outcome::Handled(0));
        assert_eq!(host.handler().events, vec![Event::Advance]);
    }

    #[test]
    fn chunk_count_mismatch_is_rejected() {
        let (mut host, mut companion) = seqpacket_link(Recorder::default());
        companion
            .sender()
            .send_frame(2, b"sig\0\x00\x00\x00\x00\x05\x01")
            .unwrap();

        let err = host.receive_and_dispatch().unwrap_err();
        assert!(matches!(
            err,
            HostError::Message(MessageError::ChunkCountMismatch { .. })
        ));
        assert!(host.handler().events.is_empty());
    }

    #[test]
    fn oversized_stream_header_is_framing_error() {
        let (host, companion) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut host = Connection::from_channel(
            Channel::from_unix_stream(host),
            Recorder::default(),
            FrameConfig::default(),
        )
        .unwrap();
        let mut raw_companion = companion;
        raw_companion.write_all(&[0x00, 0x10, 2]).unwrap();

        let err = host.receive_and_dispatch().unwrap_err();
        assert!(matches!(
            err,
            HostError::Frame(FrameError::FrameTooLarge { size: 4096, .. })
        ));
        assert!(host.handler().events.is_empty());
    }

    #[test]
    fn host_rejects_host_bound_messages() {
        let (mut host, mut companion) = seqpacket_link(Recorder::default());
        companion.sender().send_tick().unwrap();
        companion.sender().send_read_reply(&[1]).unwrap();

        assert!(matches!(
            host.receive_and_dispatch(),
            Err(HostError::UnexpectedMessage(MessageKind::Tick))
        ));
        assert!(matches!(
            host.receive_and_dispatch(),
            Err(HostError::UnexpectedMessage(MessageKind::ReadReply))
        ));
    }

    #[test]
    fn tick_reaches_companion() {
        for (mut host, mut companion) in [
            seqpacket_link(Recorder::default()),
            stream_link(Recorder::default()),
        ] {
            host.send_tick().unwrap();
            assert_eq!(companion.recv().unwrap(), Some(Message::Tick));
        }
    }

    #[test]
    fn run_stops_on_shutdown() {
        let (mut host, mut companion) = stream_link(Recorder::default());
        companion.send_go().unwrap();
        companion.send_read("a", 0).unwrap();
        companion.send_go().unwrap();
        drop(companion);

        let summary = host.run(|_| true).unwrap();
        assert_eq!(
            summary,
            RunSummary {
                handled: 3,
                shutdown: true
            }
        );
    }

    #[test]
    fn run_honours_stop_predicate() {
        let (mut host, mut companion) = seqpacket_link(Recorder::default());
        for _ in 0..5 {
            companion.send_go().unwrap();
        }

        let summary = host.run(|handler| handler.events.len() < 2).unwrap();
        assert_eq!(summary.handled, 2);
        assert!(!summary.shutdown);
    }

    #[test]
    fn close_returns_handler_and_signals_peer() {
        let (mut host, mut companion) = seqpacket_link(Recorder::default());
        companion.send_go().unwrap();
        host.receive_and_dispatch().unwrap();

        let handler = host.close();
        assert_eq!(handler.events, vec![Event::Advance]);
        assert_eq!(companion.recv().unwrap(), None);
    }

    #[test]
    fn connect_failure_reports_transport_error() {
        let path = std::env::temp_dir().join(format!("vpilink-nohost-{}.sock", std::process::id()));
        let err = Connection::connect(&Address::SeqPacket(path), Recorder::default()).unwrap_err();
        assert!(matches!(err, HostError::Transport(_)));
    }
}
