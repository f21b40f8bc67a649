use vpilink_message::{ReadRequest, WriteRequest};

use crate::sender::Sender;

/// Status returned by a handler. The dispatcher passes it through without
/// looking at it.
pub type Status = i32;

/// Result of one [`crate::Connection::receive_and_dispatch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A request was dispatched; carries the handler's status verbatim.
    Handled(Status),
    /// The companion closed the link in an orderly way.
    Shutdown,
}

/// Callbacks invoked for companion requests.
///
/// The implementing value is the per-connection user context: it is owned
/// by the connection and reachable through
/// [`crate::Connection::handler`] between calls. Every callback also gets
/// the connection's [`Sender`], so a read can be answered immediately.
pub trait Handler {
    /// `Go`: advance the simulation.
    fn on_advance(&mut self, link: &mut Sender) -> Status;

    /// `Write`: store `write.chunk_data` at `write.chunk_index` of `write.name`.
    fn on_write(&mut self, write: &WriteRequest, link: &mut Sender) -> Status;

    /// `Read`: look up `read.name` at `read.index`; usually answered with
    /// [`Sender::send_read_reply`].
    fn on_read(&mut self, read: &ReadRequest, link: &mut Sender) -> Status;
}

impl<H: Handler + ?Sized> Handler for &mut H {
    fn on_advance(&mut self, link: &mut Sender) -> Status {
        (**self).on_advance(link)
    }

    fn on_write(&mut self, write: &WriteRequest, link: &mut Sender) -> Status {
        (**self).on_write(write, link)
    }

    fn on_read(&mut self, read: &ReadRequest, link: &mut Sender) -> Status {
        (**self).on_read(read, link)
    }
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn on_advance(&mut self, link: &mut Sender) -> Status {
        (**self).on_advance(link)
    }

    fn on_write(&mut self, write: &WriteRequest, link: &mut Sender) -> Status {
        (**self).on_write(write, link)
    }

    fn on_read(&mut self, read: &ReadRequest, link: &mut Sender) -> Status {
        (**self).on_read(read, link)
    }
}
