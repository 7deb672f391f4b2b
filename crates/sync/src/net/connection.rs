use thiserror::Error;

use super::protocol::{CodecError, Message};

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Open,
    Message(Message),
    Close,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// One end of a bidirectional message link. Sends are fire-and-forget;
/// inbound traffic is pulled by the owner as a sequence of events.
pub trait Connection {
    fn send(&mut self, message: Message) -> Result<(), TransportError>;

    fn close(&mut self);

    /// Next inbound event that is ready, if any.
    fn poll_event(&mut self) -> Option<ConnectionEvent>;

    fn events(&mut self) -> Events<'_, Self>
    where
        Self: Sized,
    {
        Events { connection: self }
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn send(&mut self, message: Message) -> Result<(), TransportError> {
        (**self).send(message)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn poll_event(&mut self) -> Option<ConnectionEvent> {
        (**self).poll_event()
    }
}

/// Drains the events that are ready right now.
pub struct Events<'a, C: ?Sized> {
    connection: &'a mut C,
}

impl<C: Connection + ?Sized> Iterator for Events<'_, C> {
    type Item = ConnectionEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.connection.poll_event()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LinkStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}
