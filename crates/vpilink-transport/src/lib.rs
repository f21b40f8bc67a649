//! Local transports for the vpilink simulator link.
//!
//! Two families of channel are supported:
//! - `SOCK_SEQPACKET` Unix sockets, which preserve message boundaries
//! - byte streams (TCP, Unix stream sockets), which need explicit framing
//!
//! Every [`Channel`] reports which of the two it is through [`Framing`], so
//! the layers above can pick a framing strategy without caring which
//! transport is underneath.

pub mod address;
pub mod channel;
pub mod error;
pub mod listener;

#[cfg(unix)]
pub mod seqpacket;

pub use address::Address;
pub use channel::{Channel, Framing};
pub use error::{Result, TransportError};
pub use listener::Listener;

#[cfg(unix)]
pub use seqpacket::{SeqPacketListener, SeqPacketStream};
