use std::fmt;

use crate::clock::{Clock, Millis};
use crate::config::ReceiverConfig;
use crate::error::SyncError;
use crate::net::{Connection, ConnectionEvent, Message, MessageKind};
use crate::playout::PlayoutScheduler;
use crate::snapshot::{SimulationState, SnapshotBuffer};
use crate::sync::{ClockSync, OffsetEstimate};

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverStats {
    pub buffer_size: usize,
    pub snapshots_received: u64,
    pub offset_ms: Option<Millis>,
    pub round_trip_ms: Option<Millis>,
    pub newest_snapshot_ms: Option<Millis>,
    pub virtual_time_ms: Option<Millis>,
    pub probe_round_trip_ms: Option<Millis>,
}

impl fmt::Display for ReceiverStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer size {}", self.buffer_size)?;
        match self.offset_ms {
            Some(offset) => write!(f, ", offset {offset} ms"),
            None => write!(f, ", unsynced"),
        }
    }
}

/// The observer side: synchronises its clock with the authority on open,
/// buffers incoming snapshots, and answers "what should be on screen now".
pub struct Receiver<C, K> {
    connection: C,
    clock: K,
    config: ReceiverConfig,
    sync: ClockSync,
    playout: PlayoutScheduler,
    buffer: SnapshotBuffer,
    closed: bool,
    snapshots_received: u64,
    probe_sent_at: Option<Millis>,
    probe_round_trip: Option<Millis>,
}

impl<C: Connection, K: Clock> Receiver<C, K> {
    pub fn new(connection: C, clock: K, config: ReceiverConfig) -> Self {
        let buffer = SnapshotBuffer::new(config.backlog()).with_edge_policy(config.edge_policy);

        Self {
            connection,
            clock,
            playout: PlayoutScheduler::new(config.delay_ms),
            config,
            sync: ClockSync::new(),
            buffer,
            closed: false,
            snapshots_received: 0,
            probe_sent_at: None,
            probe_round_trip: None,
        }
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    pub fn delay(&self) -> Millis {
        self.playout.delay()
    }

    /// Changes the playout delay and re-derives the backlog from it.
    pub fn set_delay(&mut self, delay: Millis) {
        self.config.delay_ms = delay;
        self.playout.set_delay(delay);
        self.buffer.set_backlog(self.config.backlog());
        log::debug!(
            "playout delay {} ms, backlog {} ms",
            self.playout.delay(),
            self.buffer.backlog()
        );
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    pub fn buffer(&self) -> &SnapshotBuffer {
        &self.buffer
    }

    pub fn is_synced(&self) -> bool {
        self.sync.is_synced()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Processes every inbound event that has arrived. Returns how many.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.connection.poll_event() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Open => self.on_open(),
            ConnectionEvent::Message(message) => self.on_message(message),
            ConnectionEvent::Close => {
                log::info!("connection to authority closed");
                self.closed = true;
            }
        }
    }

    fn on_open(&mut self) {
        self.sync.begin(self.clock.now_ms());
        if let Err(e) = self.connection.send(Message::new(MessageKind::PingB)) {
            log::warn!("failed to start clock handshake: {e}");
        }
    }

    fn on_message(&mut self, message: Message) {
        if message.kind != MessageKind::Snapshot {
            log::debug!("received {}", message.kind.as_str());
        }

        match (message.kind, message.t) {
            (MessageKind::Snapshot, Some(time)) => match message.data {
                Some(state) => {
                    self.buffer.add(time, state);
                    self.snapshots_received += 1;
                }
                None => log::warn!("snapshot at {time} without state"),
            },
            (MessageKind::PingBReply, Some(remote)) => {
                match self.sync.complete(remote, self.clock.now_ms()) {
                    Some(OffsetEstimate { offset, round_trip }) => {
                        log::info!("latency {round_trip} ms round-trip");
                        log::info!("authority time offset {offset} ms");
                    }
                    None => log::warn!("unsolicited {}", message.kind.as_str()),
                }
            }
            (MessageKind::PingAReply, _) => {
                if let Some(sent_at) = self.probe_sent_at.take() {
                    self.probe_round_trip = Some(self.clock.now_ms() - sent_at);
                }
            }
            (kind, _) => log::warn!("ignoring malformed or unexpected {}", kind.as_str()),
        }
    }

    /// Sends a liveness probe; the round trip shows up in `stats`.
    pub fn probe(&mut self) {
        match self.connection.send(Message::new(MessageKind::PingA)) {
            Ok(()) => self.probe_sent_at = Some(self.clock.now_ms()),
            Err(e) => log::warn!("probe failed: {e}"),
        }
    }

    pub fn offset(&self) -> Result<Millis, SyncError> {
        self.sync.offset()
    }

    pub fn virtual_time(&self) -> Result<Millis, SyncError> {
        self.playout
            .virtual_time(self.clock.now_ms(), self.sync.offset().ok())
    }

    /// State to render now. `None` until the clock is synchronised and at
    /// least one snapshot has arrived.
    pub fn state(&self) -> Option<SimulationState> {
        let time = self.virtual_time().ok()?;
        self.buffer.state_at(time)
    }

    pub fn close(&mut self) {
        self.connection.close();
        self.closed = true;
    }

    pub fn log_stats(&self) {
        log::info!("stats: {}", self.stats());
    }

    pub fn stats(&self) -> ReceiverStats {
        let estimate = self.sync.estimate().ok();
        ReceiverStats {
            buffer_size: self.buffer.len(),
            snapshots_received: self.snapshots_received,
            offset_ms: estimate.map(|e| e.offset),
            round_trip_ms: estimate.map(|e| e.round_trip),
            newest_snapshot_ms: self.buffer.newest().map(|s| s.time),
            virtual_time_ms: self.virtual_time().ok(),
            probe_round_trip_ms: self.probe_round_trip,
        }
    }
}
