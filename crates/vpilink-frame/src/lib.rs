//! Frame codec for the vpilink simulator link.
//!
//! A frame is one message-type byte followed by its payload. How frames are
//! delimited depends on the channel:
//! - message-preserving channels carry `[type][payload]` as one packet
//! - stream channels prefix every frame with a 2-byte little-endian total
//!   length that counts the length bytes themselves
//!
//! [`FrameReader`] and [`FrameWriter`] pick the strategy from [`Framing`]
//! when they are built; callers always get complete frames.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_packet, decode_prefixed, encode_frame, Frame, FrameConfig, LENGTH_HEADER_LEN,
    MAX_FRAME_LEN, MIN_MAX_FRAME_LEN,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use vpilink_transport::Framing;
pub use writer::FrameWriter;
