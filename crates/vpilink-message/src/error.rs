use crate::message::MessageKind;

/// Errors that can occur while encoding or decoding message payloads.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MessageError {
    /// A fixed-width field or byte run extends past the end of the payload.
    #[error("truncated payload (needed {needed} bytes, {remaining} remaining)")]
    Truncated { needed: usize, remaining: usize },

    /// No NUL terminator was found before the end of the payload.
    #[error("name is not NUL-terminated within the payload")]
    UnterminatedName,

    /// A name is empty, contains a NUL byte, or is not UTF-8.
    #[error("invalid name: {0}")]
    InvalidName(&'static str),

    /// Bytes left over after the last field of a message.
    #[error("malformed {kind} message: {trailing} trailing bytes")]
    TrailingBytes { kind: MessageKind, trailing: usize },

    /// The declared chunk count disagrees with the bytes that follow it.
    #[error("chunk count {declared} does not match {remaining} remaining bytes")]
    ChunkCountMismatch { declared: usize, remaining: usize },

    /// A message that carries no payload arrived with one.
    #[error("{kind} message must have an empty payload, got {len} bytes")]
    UnexpectedPayload { kind: MessageKind, len: usize },

    /// The type byte does not name any message.
    #[error("unknown message type {0}")]
    UnknownType(u8),

    /// Chunk data does not fit the one-byte chunk count.
    #[error("{0} chunks exceed the limit of 255")]
    ChunkTooLong(usize),
}

pub type Result<T> = std::result::Result<T, MessageError>;
