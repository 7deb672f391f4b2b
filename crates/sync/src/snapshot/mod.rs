mod buffer;
mod state;
mod value;

pub use buffer::{DEFAULT_BACKLOG_MS, EdgePolicy, Snapshot, SnapshotBuffer};
pub use state::{EntityId, SimulationState, blend_state};
pub use value::{Entity, FieldKind, FieldValue, Opaque, blend_entity};
