use vpilink_message::MessageKind;

/// Errors that can occur on a host or companion connection.
///
/// Orderly peer shutdown is not an error; it is reported as
/// [`crate::Outcome::Shutdown`] (or `None` from [`crate::Companion::recv`]).
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Transport-level error (socket creation, connect, accept).
    #[error("transport error: {0}")]
    Transport(#[from] vpilink_transport::TransportError),

    /// Framing error (oversized frame, bad length header, short write, I/O).
    #[error("frame error: {0}")]
    Frame(#[from] vpilink_frame::FrameError),

    /// Malformed payload or unknown message type.
    #[error("message error: {0}")]
    Message(#[from] vpilink_message::MessageError),

    /// A well-formed message that this side of the link never accepts.
    #[error("unexpected {0} message")]
    UnexpectedMessage(MessageKind),
}

pub type Result<T> = std::result::Result<T, HostError>;
