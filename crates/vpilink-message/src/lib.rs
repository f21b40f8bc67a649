//! Message model for the vpilink simulator protocol.
//!
//! Five messages travel over the link. The companion sends `Go`, `Write` and
//! `Read`; the host sends `Tick` and `ReadReply`. Payload layouts (framing
//! and the type byte are handled by `vpilink-frame`):
//!
//! ```text
//! Write:      [name\0][chunk_index: u32 LE][chunk_count: u8][chunk_data...]
//! Read:       [name\0][index: u32 LE]
//! ReadReply:  [chunk_count: u8][chunk_data...]
//! Tick, Go:   (empty)
//! ```

pub mod cursor;
pub mod error;
pub mod message;

pub use cursor::{ByteReader, ByteWriter};
pub use error::{MessageError, Result};
pub use message::{Message, MessageKind, ReadReply, ReadRequest, WriteRequest, MAX_CHUNKS};
