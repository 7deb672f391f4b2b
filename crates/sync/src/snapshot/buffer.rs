use std::collections::VecDeque;

use serde::Deserialize;

use crate::clock::Millis;

use super::state::{SimulationState, blend_state};

pub const DEFAULT_BACKLOG_MS: Millis = 1000;

/// What `state_at` does with a time outside the stored range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgePolicy {
    /// Follow the slope of the two nearest snapshots.
    #[default]
    Extrapolate,
    /// Return the nearest stored snapshot unchanged.
    Clamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub time: Millis,
    pub state: SimulationState,
}

/// Time-ordered history of snapshots, bounded by age with a floor of two
/// entries so there is always a pair to blend once two have arrived.
#[derive(Debug)]
pub struct SnapshotBuffer {
    snapshots: VecDeque<Snapshot>,
    backlog: Millis,
    edge_policy: EdgePolicy,
}

impl Default for SnapshotBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BACKLOG_MS)
    }
}

impl SnapshotBuffer {
    pub fn new(backlog: Millis) -> Self {
        Self {
            snapshots: VecDeque::new(),
            backlog,
            edge_policy: EdgePolicy::default(),
        }
    }

    pub fn with_edge_policy(mut self, edge_policy: EdgePolicy) -> Self {
        self.edge_policy = edge_policy;
        self
    }

    pub fn backlog(&self) -> Millis {
        self.backlog
    }

    pub fn set_backlog(&mut self, backlog: Millis) {
        self.backlog = backlog;
    }

    pub fn edge_policy(&self) -> EdgePolicy {
        self.edge_policy
    }

    pub fn set_edge_policy(&mut self, edge_policy: EdgePolicy) {
        self.edge_policy = edge_policy;
    }

    /// Stores `state` at `time`. Anything already stored at or after `time`
    /// is dropped first, then old entries are evicted down to the floor.
    pub fn add(&mut self, time: Millis, state: SimulationState) {
        while self.snapshots.back().is_some_and(|s| s.time >= time) {
            self.snapshots.pop_back();
        }

        self.snapshots.push_back(Snapshot { time, state });

        let max_age = time - self.backlog;
        while self.snapshots.len() > 2 && self.snapshots.front().is_some_and(|s| s.time < max_age) {
            self.snapshots.pop_front();
        }
    }

    pub fn newest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }

    /// State at `time`: the stored state on an exact hit, a blend of the
    /// bracketing pair inside the range, and the edge policy outside it.
    /// `None` only while the buffer is empty.
    pub fn state_at(&self, time: Millis) -> Option<SimulationState> {
        let len = self.snapshots.len();
        if len == 0 {
            return None;
        }

        let mut before = None;
        let mut after = None;
        for (index, snapshot) in self.snapshots.iter().enumerate() {
            if snapshot.time == time {
                return Some(snapshot.state.clone());
            }
            if snapshot.time < time {
                before = Some(index);
            } else {
                after = Some(index);
                break;
            }
        }

        match (before, after) {
            (Some(from), Some(to)) => Some(self.blend(from, to, time)),
            (None, _) => match (len, self.edge_policy) {
                (1, _) | (_, EdgePolicy::Clamp) => Some(self.snapshots[0].state.clone()),
                _ => Some(self.blend(0, 1, time)),
            },
            (_, None) => match (len, self.edge_policy) {
                (1, _) | (_, EdgePolicy::Clamp) => Some(self.snapshots[len - 1].state.clone()),
                _ => Some(self.blend(len - 2, len - 1, time)),
            },
        }
    }

    fn blend(&self, from: usize, to: usize, time: Millis) -> SimulationState {
        let from = &self.snapshots[from];
        let to = &self.snapshots[to];
        let frac = (time - from.time) as f64 / (to.time - from.time) as f64;
        blend_state(&from.state, &to.state, frac)
    }
}
