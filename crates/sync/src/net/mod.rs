mod connection;
pub mod loopback;
mod protocol;

pub use connection::{Connection, ConnectionEvent, Events, LinkStats, TransportError};
pub use loopback::{LinkConditions, LoopbackConnection};
pub use protocol::{CodecError, Message, MessageKind};
