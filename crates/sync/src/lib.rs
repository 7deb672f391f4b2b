pub mod authority;
pub mod clock;
pub mod config;
pub mod error;
pub mod net;
pub mod playout;
pub mod receiver;
pub mod schedule;
pub mod snapshot;
pub mod sync;

pub use authority::{Authority, AuthorityStats, PeerId, Simulation};
pub use clock::{Clock, ManualClock, Millis, SystemClock};
pub use config::{AuthorityConfig, ReceiverConfig};
pub use error::SyncError;
pub use net::{
    CodecError, Connection, ConnectionEvent, LinkConditions, LinkStats, LoopbackConnection,
    Message, MessageKind, TransportError,
};
pub use playout::PlayoutScheduler;
pub use receiver::{Receiver, ReceiverStats};
pub use schedule::{FixedInterval, Schedule, Task};
pub use snapshot::{
    EdgePolicy, Entity, EntityId, FieldValue, Opaque, SimulationState, Snapshot, SnapshotBuffer,
    blend_entity, blend_state,
};
pub use sync::{ClockSync, OffsetEstimate};
