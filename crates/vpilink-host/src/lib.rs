//! Host side of the vpilink simulator link.
//!
//! The host (the simulator) connects to a companion process, then drives
//! [`Connection::receive_and_dispatch`] from its evaluation loop. Each call
//! reads one frame, decodes it and hands it to the [`Handler`]. Ticks and
//! read replies go out through [`Sender`], either from the connection or
//! from inside a handler callback.
//!
//! The [`companion`] module holds the other end of the link, used by tools
//! and tests that stand in for the companion process.

pub mod companion;
pub mod connection;
pub mod error;
pub mod handler;
pub mod sender;

pub use companion::{Companion, CompanionListener};
pub use connection::{Connection, RunSummary};
pub use error::{HostError, Result};
pub use handler::{Handler, Outcome, Status};
pub use sender::Sender;

pub use vpilink_frame::{FrameConfig, Framing, MAX_FRAME_LEN};
pub use vpilink_message::{Message, MessageKind, ReadReply, ReadRequest, WriteRequest};
pub use vpilink_transport::Address;
