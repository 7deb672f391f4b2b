use crate::clock::Millis;
use crate::error::SyncError;

/// Outcome of one ping/pong exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetEstimate {
    /// `authority_time ≈ local_time + offset`
    pub offset: Millis,
    pub round_trip: Millis,
}

/// One-shot clock offset handshake against the authority.
///
/// The receiver sends a ping and notes its local send time. The reply carries
/// the authority's clock; half the round trip is assumed to have elapsed on
/// the way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSync {
    Unsynced { ping_sent_at: Option<Millis> },
    Synced(OffsetEstimate),
}

impl Default for ClockSync {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSync {
    pub fn new() -> Self {
        Self::Unsynced { ping_sent_at: None }
    }

    /// Records the local send time of a ping. Starting over discards any
    /// earlier estimate.
    pub fn begin(&mut self, now: Millis) {
        *self = Self::Unsynced {
            ping_sent_at: Some(now),
        };
    }

    /// Completes the handshake with the authority time `remote` carried by
    /// the reply, received at local time `now`. Replies nobody asked for are
    /// ignored and `None` is returned.
    pub fn complete(&mut self, remote: Millis, now: Millis) -> Option<OffsetEstimate> {
        let Self::Unsynced {
            ping_sent_at: Some(sent_at),
        } = *self
        else {
            return None;
        };

        let round_trip = now - sent_at;
        let estimate = OffsetEstimate {
            offset: (remote - now) + round_trip / 2,
            round_trip,
        };
        *self = Self::Synced(estimate);
        Some(estimate)
    }

    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced(_))
    }

    pub fn estimate(&self) -> Result<OffsetEstimate, SyncError> {
        match self {
            Self::Synced(estimate) => Ok(*estimate),
            _ => Err(SyncError::Unsynced),
        }
    }

    pub fn offset(&self) -> Result<Millis, SyncError> {
        self.estimate().map(|e| e.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsynced_until_reply() {
        let mut sync = ClockSync::new();
        assert_eq!(sync.offset(), Err(SyncError::Unsynced));

        sync.begin(1_000);
        assert_eq!(sync.offset(), Err(SyncError::Unsynced));
        assert!(!sync.is_synced());
    }

    #[test]
    fn symmetric_latency_is_exact() {
        let true_offset = -5_000;
        let latency = 50;
        let sent_at = 10_000;

        let mut sync = ClockSync::new();
        sync.begin(sent_at);
        let remote = sent_at + latency + true_offset;
        let estimate = sync.complete(remote, sent_at + 2 * latency).unwrap();

        assert_eq!(estimate.offset, true_offset);
        assert_eq!(estimate.round_trip, 100);
        assert_eq!(sync.offset(), Ok(true_offset));
    }

    #[test]
    fn asymmetric_latency_errs_by_half_the_difference() {
        let mut sync = ClockSync::new();
        sync.begin(0);
        // 80 ms out, 20 ms back, authority clock identical to ours.
        let offset = sync.complete(80, 100).unwrap().offset;
        assert_eq!(offset, 30);
    }

    #[test]
    fn stray_reply_is_ignored() {
        let mut sync = ClockSync::new();
        assert_eq!(sync.complete(500, 100), None);
        assert!(!sync.is_synced());
    }
}
