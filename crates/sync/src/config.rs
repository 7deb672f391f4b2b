use serde::Deserialize;

use crate::clock::Millis;
use crate::playout::recommended_backlog;
use crate::snapshot::{DEFAULT_BACKLOG_MS, EdgePolicy};

pub const DEFAULT_TICK_RATE: u32 = 60;
pub const DEFAULT_BROADCAST_RATE: u32 = 12;
pub const DEFAULT_STATS_INTERVAL_MS: u64 = 2000;

/// Covers one broadcast gap at any reasonable broadcast rate.
pub const DEFAULT_BACKLOG_MARGIN_MS: Millis = 150;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Simulation steps per second.
    pub tick_rate: u32,
    /// Snapshot pushes per second.
    pub broadcast_rate: u32,
    /// Period of the stats log line; zero turns it off.
    pub stats_interval_ms: u64,
    pub backlog_ms: Millis,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            broadcast_rate: DEFAULT_BROADCAST_RATE,
            stats_interval_ms: DEFAULT_STATS_INTERVAL_MS,
            backlog_ms: DEFAULT_BACKLOG_MS,
        }
    }
}

impl AuthorityConfig {
    pub fn broadcast_interval_ms(&self) -> Millis {
        1000 / self.broadcast_rate.max(1) as Millis
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub delay_ms: Millis,
    /// Fixed backlog; derived from the delay when unset.
    pub backlog_ms: Option<Millis>,
    pub backlog_margin_ms: Millis,
    pub edge_policy: EdgePolicy,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            delay_ms: 0,
            backlog_ms: None,
            backlog_margin_ms: DEFAULT_BACKLOG_MARGIN_MS,
            edge_policy: EdgePolicy::default(),
        }
    }
}

impl ReceiverConfig {
    pub fn with_delay(delay_ms: Millis) -> Self {
        Self {
            delay_ms,
            ..Default::default()
        }
    }

    pub fn backlog(&self) -> Millis {
        self.backlog_ms
            .unwrap_or_else(|| recommended_backlog(self.delay_ms, self.backlog_margin_ms))
    }
}
