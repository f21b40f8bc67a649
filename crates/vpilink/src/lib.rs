//! Link between a hardware simulator and a companion process.
//!
//! The simulator side (the host) connects to a companion over a Unix
//! seqpacket socket, a Unix stream socket or TCP, then services the
//! companion's requests one frame at a time: advance the simulation, write
//! a signal value, read a signal value. The host answers with ticks and read
//! replies.
//!
//! # Crate Structure
//!
//! - [`transport`]: addresses, connected channels and listeners
//! - [`frame`]: message-preserving and length-prefixed framing
//! - [`message`]: the five protocol messages and their payload layout
//! - [`host`]: the dispatcher, the handler trait and the companion endpoint

/// Re-export transport types.
pub mod transport {
    pub use vpilink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use vpilink_frame::*;
}

/// Re-export message types.
pub mod message {
    pub use vpilink_message::*;
}

/// Re-export host types.
pub mod host {
    pub use vpilink_host::*;
}
