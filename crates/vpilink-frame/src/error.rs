/// Errors that can occur while framing or deframing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame is at or above the maximum frame length.
    #[error("frame too large ({size} bytes, limit is below {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A length header declares a size that cannot hold a message-type byte.
    #[error("invalid frame length header: {declared}")]
    InvalidLength { declared: usize },

    /// A packet arrived without a message-type byte.
    #[error("empty frame")]
    EmptyFrame,

    /// The transport accepted fewer bytes than the encoded frame.
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
