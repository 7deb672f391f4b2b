use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

use crate::clock::Millis;
use crate::snapshot::SimulationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub enum MessageKind {
    /// Liveness probe, receiver to authority.
    PingA,
    PingAReply,
    /// Clock handshake, receiver to authority.
    PingB,
    /// Carries the authority's clock in `t`.
    PingBReply,
    /// Periodic state push, authority to receiver.
    Snapshot,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::PingA => "ping-a",
            MessageKind::PingAReply => "ping-a-reply",
            MessageKind::PingB => "ping-b",
            MessageKind::PingBReply => "ping-b-reply",
            MessageKind::Snapshot => "snapshot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub data: Option<SimulationState>,
    /// Authority-relative time.
    pub t: Option<Millis>,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encoding failed: {0}")]
    Encode(rancor::Error),
    #[error("decoding failed: {0}")]
    Decode(rancor::Error),
}

impl Message {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            data: None,
            t: None,
        }
    }

    pub fn snapshot(time: Millis, state: SimulationState) -> Self {
        Self {
            kind: MessageKind::Snapshot,
            data: Some(state),
            t: Some(time),
        }
    }

    /// Fills in `t` when the sender left it out.
    pub fn stamped(mut self, now: Millis) -> Self {
        self.t.get_or_insert(now);
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(CodecError::Encode)
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        // Received buffers carry no alignment guarantee.
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);
        rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(CodecError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Entity;

    #[test]
    fn wire_names() {
        assert_eq!(MessageKind::PingA.as_str(), "ping-a");
        assert_eq!(MessageKind::PingAReply.as_str(), "ping-a-reply");
        assert_eq!(MessageKind::PingB.as_str(), "ping-b");
        assert_eq!(MessageKind::PingBReply.as_str(), "ping-b-reply");
        assert_eq!(MessageKind::Snapshot.as_str(), "snapshot");
    }

    #[test]
    fn stamping_keeps_existing_time() {
        assert_eq!(Message::new(MessageKind::PingBReply).stamped(42).t, Some(42));
        let snapshot = Message::snapshot(7, SimulationState::new()).stamped(42);
        assert_eq!(snapshot.t, Some(7));
    }

    #[test]
    fn snapshot_survives_the_wire() {
        let state = SimulationState::new()
            .with(
                "a",
                Entity::new()
                    .with("angle", 0.5)
                    .with("color", "red")
                    .with("position", [1.0, 2.0]),
            )
            .with("b", Entity::new().with("visible", false));
        let message = Message::snapshot(1_234, state);

        let bytes = message.encode().unwrap();
        assert_eq!(Message::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Message::decode(&[0xde, 0xad, 0xbe, 0xef]).is_err());
    }
}
