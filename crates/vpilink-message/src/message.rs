use std::fmt;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{MessageError, Result};

/// Largest number of chunks one message can carry.
pub const MAX_CHUNKS: usize = u8::MAX as usize;

/// Message type byte as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Tick = 0,
    Go = 1,
    Write = 2,
    Read = 3,
    ReadReply = 4,
}

impl MessageKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Tick => "tick",
            MessageKind::Go => "go",
            MessageKind::Write => "write",
            MessageKind::Read => "read",
            MessageKind::ReadReply => "read_reply",
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = MessageError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(MessageKind::Tick),
            1 => Ok(MessageKind::Go),
            2 => Ok(MessageKind::Write),
            3 => Ok(MessageKind::Read),
            4 => Ok(MessageKind::ReadReply),
            other => Err(MessageError::UnknownType(other)),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Companion asks the host to store chunks of a signal value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub name: String,
    pub chunk_index: u32,
    pub chunk_data: Bytes,
}

impl WriteRequest {
    pub fn new(name: impl Into<String>, chunk_index: u32, chunk_data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            chunk_index,
            chunk_data: chunk_data.into(),
        }
    }

    /// Number of chunks carried. Always fits a byte for decoded requests.
    pub fn chunk_count(&self) -> usize {
        self.chunk_data.len()
    }
}

/// Companion asks the host for the value of a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub name: String,
    pub index: u32,
}

impl ReadRequest {
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

/// Host answers a [`ReadRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReply {
    pub chunk_data: Bytes,
}

impl ReadReply {
    pub fn new(chunk_data: impl Into<Bytes>) -> Self {
        Self {
            chunk_data: chunk_data.into(),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_data.len()
    }
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Host liveness / poll signal.
    Tick,
    /// Advance the simulation.
    Go,
    Write(WriteRequest),
    Read(ReadRequest),
    ReadReply(ReadReply),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Tick => MessageKind::Tick,
            Message::Go => MessageKind::Go,
            Message::Write(_) => MessageKind::Write,
            Message::Read(_) => MessageKind::Read,
            Message::ReadReply(_) => MessageKind::ReadReply,
        }
    }

    /// Decode a payload that arrived with type byte `msg_type`.
    ///
    /// Every length is checked before it is used; bytes left over after the
    /// last field are an error, never ignored.
    pub fn decode(msg_type: u8, payload: Bytes) -> Result<Message> {
        let kind = MessageKind::try_from(msg_type)?;
        let mut reader = ByteReader::new(payload);

        let message = match kind {
            MessageKind::Tick | MessageKind::Go => {
                if !reader.is_empty() {
                    return Err(MessageError::UnexpectedPayload {
                        kind,
                        len: reader.remaining(),
                    });
                }
                if kind == MessageKind::Tick {
                    Message::Tick
                } else {
                    Message::Go
                }
            }
            MessageKind::Write => {
                let name = reader.read_cstr()?;
                let chunk_index = reader.read_u32_le()?;
                let chunk_data = read_chunks(&mut reader)?;
                Message::Write(WriteRequest {
                    name,
                    chunk_index,
                    chunk_data,
                })
            }
            MessageKind::Read => {
                let name = reader.read_cstr()?;
                let index = reader.read_u32_le()?;
                if !reader.is_empty() {
                    return Err(MessageError::TrailingBytes {
                        kind,
                        trailing: reader.remaining(),
                    });
                }
                Message::Read(ReadRequest { name, index })
            }
            MessageKind::ReadReply => Message::ReadReply(ReadReply {
                chunk_data: read_chunks(&mut reader)?,
            }),
        };

        trace!(kind = %kind, "message decoded");
        Ok(message)
    }

    /// Append this message's payload (without the type byte) to `dst`.
    ///
    /// Nothing is written if the message cannot be represented on the wire.
    pub fn encode_payload(&self, dst: &mut BytesMut) -> Result<()> {
        let mut payload = BytesMut::new();
        let mut writer = ByteWriter::new(&mut payload);
        match self {
            Message::Tick | Message::Go => {}
            Message::Write(write) => {
                writer.put_cstr(&write.name)?.put_u32_le(write.chunk_index);
                writer.put_chunks(&write.chunk_data)?;
            }
            Message::Read(read) => {
                writer.put_cstr(&read.name)?.put_u32_le(read.index);
            }
            Message::ReadReply(reply) => {
                writer.put_chunks(&reply.chunk_data)?;
            }
        }
        dst.extend_from_slice(&payload);
        Ok(())
    }

    /// Encode the payload into a fresh buffer.
    pub fn to_payload(&self) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        self.encode_payload(&mut dst)?;
        Ok(dst.freeze())
    }
}

/// `[chunk_count: u8][chunk_data...]`, with exactly `chunk_count` bytes left.
fn read_chunks(reader: &mut ByteReader) -> Result<Bytes> {
    let declared = reader.read_u8()? as usize;
    if reader.remaining() != declared {
        return Err(MessageError::ChunkCountMismatch {
            declared,
            remaining: reader.remaining(),
        });
    }
    Ok(reader.read_rest())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(message: &Message) -> Message {
        let payload = message.to_payload().unwrap();
        Message::decode(message.kind().tag(), payload).unwrap()
    }

    #[test]
    fn decodes_write_scenario() {
        let payload = Bytes::from_static(b"sig_a\0\x03\x00\x00\x00\x02\x01\x02");
        let message = Message::decode(2, payload).unwrap();
        let Message::Write(write) = message else {
            panic!("expected write, got {message:?}");
        };
        assert_eq!(write.name, "sig_a");
        assert_eq!(write.chunk_index, 3);
        assert_eq!(write.chunk_count(), 2);
        assert_eq!(write.chunk_data.as_ref(), &[1, 2]);
    }

    #[test]
    fn decodes_read_scenario() {
        let message = Message::decode(3, Bytes::from_static(b"sig_b\0\x07\x00\x00\x00")).unwrap();
        assert_eq!(message, Message::Read(ReadRequest::new("sig_b", 7)));
    }

    #[test]
    fn chunk_index_is_little_endian() {
        let message =
            Message::decode(2, Bytes::from_static(b"s\0\x78\x56\x34\x12\x00")).unwrap();
        assert_eq!(
            message,
            Message::Write(WriteRequest::new("s", 0x1234_5678, Bytes::new()))
        );
    }

    #[test]
    fn write_roundtrip_preserves_fields() {
        let cases = [
            WriteRequest::new("a", 0, Bytes::new()),
            WriteRequest::new("top.cpu.pc", 1, vec![0xDE, 0xAD, 0xBE, 0xEF]),
            WriteRequest::new("mem", u32::MAX, vec![0x5A; 255]),
            WriteRequest::new("ünïcode", 42, vec![0]),
        ];
        for write in cases {
            let message = Message::Write(write);
            assert_eq!(roundtrip(&message), message);
        }
    }

    #[test]
    fn read_reply_roundtrip_for_every_chunk_count() {
        for count in 0..=MAX_CHUNKS {
            let data: Vec<u8> = (0..count).map(|i| (i * 7) as u8).collect();
            let message = Message::ReadReply(ReadReply::new(data.clone()));
            let payload = message.to_payload().unwrap();
            assert_eq!(payload.len(), count + 1);
            assert_eq!(payload[0] as usize, count);
            let Message::ReadReply(decoded) = Message::decode(4, payload).unwrap() else {
                panic!("expected read reply");
            };
            assert_eq!(decoded.chunk_data.as_ref(), data.as_slice());
        }
    }

    #[test]
    fn read_reply_with_256_chunks_is_rejected() {
        let message = Message::ReadReply(ReadReply::new(vec![0u8; 256]));
        assert_eq!(message.to_payload(), Err(MessageError::ChunkTooLong(256)));
    }

    #[test]
    fn empty_messages_reject_payload() {
        assert_eq!(Message::decode(1, Bytes::new()).unwrap(), Message::Go);
        assert_eq!(Message::decode(0, Bytes::new()).unwrap(), Message::Tick);
        assert_eq!(
            Message::decode(1, Bytes::from_static(&[0])),
            Err(MessageError::UnexpectedPayload {
                kind: MessageKind::Go,
                len: 1
            })
        );
        assert!(matches!(
            Message::decode(0, Bytes::from_static(&[1, 2])),
            Err(MessageError::UnexpectedPayload { .. })
        ));
    }

    #[test]
    fn write_chunk_count_mismatch() {
        // Declares 3 chunks, carries 2.
        let short = Bytes::from_static(b"sig\0\x00\x00\x00\x00\x03\x01\x02");
        assert_eq!(
            Message::decode(2, short),
            Err(MessageError::ChunkCountMismatch {
                declared: 3,
                remaining: 2
            })
        );
        // Declares 1 chunk, carries 2.
        let long = Bytes::from_static(b"sig\0\x00\x00\x00\x00\x01\x01\x02");
        assert!(matches!(
            Message::decode(2, long),
            Err(MessageError::ChunkCountMismatch { .. })
        ));
    }

    #[test]
    fn write_needs_five_bytes_after_name() {
        let payload = Bytes::from_static(b"sig\0\x01\x00\x00\x00");
        assert_eq!(
            Message::decode(2, payload),
            Err(MessageError::Truncated {
                needed: 1,
                remaining: 0
            })
        );
        let payload = Bytes::from_static(b"sig\0\x01\x00");
        assert!(matches!(
            Message::decode(2, payload),
            Err(MessageError::Truncated { needed: 4, .. })
        ));
    }

    #[test]
    fn read_requires_exactly_four_bytes_after_name() {
        assert!(matches!(
            Message::decode(3, Bytes::from_static(b"sig\0\x01\x00\x00")),
            Err(MessageError::Truncated { .. })
        ));
        assert_eq!(
            Message::decode(3, Bytes::from_static(b"sig\0\x01\x00\x00\x00\xFF")),
            Err(MessageError::TrailingBytes {
                kind: MessageKind::Read,
                trailing: 1
            })
        );
    }

    #[test]
    fn unterminated_name_is_rejected() {
        assert_eq!(
            Message::decode(3, Bytes::from_static(b"sig_b")),
            Err(MessageError::UnterminatedName)
        );
        assert_eq!(
            Message::decode(2, Bytes::new()),
            Err(MessageError::UnterminatedName)
        );
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert_eq!(
            Message::decode(9, Bytes::new()),
            Err(MessageError::UnknownType(9))
        );
        assert_eq!(
            MessageKind::try_from(255),
            Err(MessageError::UnknownType(255))
        );
    }

    #[test]
    fn encode_leaves_buffer_untouched_on_error() {
        let mut dst = BytesMut::from(&b"keep"[..]);
        let bad = Message::Write(WriteRequest::new("ok", 1, vec![0u8; 300]));
        assert!(bad.encode_payload(&mut dst).is_err());
        assert_eq!(dst.as_ref(), b"keep");

        let bad_name = Message::Read(ReadRequest::new("a\0b", 1));
        assert!(matches!(
            bad_name.encode_payload(&mut dst),
            Err(MessageError::InvalidName(_))
        ));
    }

    #[test]
    fn tags_match_wire_values() {
        let kinds = [
            (MessageKind::Tick, 0),
            (MessageKind::Go, 1),
            (MessageKind::Write, 2),
            (MessageKind::Read, 3),
            (MessageKind::ReadReply, 4),
        ];
        for (kind, tag) in kinds {
            assert_eq!(kind.tag(), tag);
            assert_eq!(MessageKind::try_from(tag).unwrap(), kind);
        }
    }
}
