use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::clock::{Clock, Millis};
use crate::config::AuthorityConfig;
use crate::net::{Connection, ConnectionEvent, Message, MessageKind, TransportError};
use crate::schedule::{FixedInterval, Schedule, Task};
use crate::snapshot::{SimulationState, Snapshot, SnapshotBuffer};

/// Steps the simulation forward by `dt` seconds.
pub trait Simulation {
    fn advance(&mut self, state: &SimulationState, dt: f64) -> SimulationState;
}

impl<F> Simulation for F
where
    F: FnMut(&SimulationState, f64) -> SimulationState,
{
    fn advance(&mut self, state: &SimulationState, dt: f64) -> SimulationState {
        self(state, dt)
    }
}

pub type PeerId = u32;

struct Peer {
    id: PeerId,
    connection: Box<dyn Connection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorityStats {
    pub time_ms: Millis,
    pub buffer_size: usize,
    pub connection_count: usize,
    pub ticks: u64,
    pub broadcasts: u64,
    pub diagnostics: u64,
}

/// The server side: owns the authoritative history, advances it at the tick
/// rate and pushes the newest snapshot to every receiver at the broadcast
/// rate. Authority time is milliseconds since `start`.
pub struct Authority<K, S> {
    clock: K,
    simulation: S,
    config: AuthorityConfig,
    buffer: SnapshotBuffer,
    peers: Vec<Peer>,
    next_peer_id: PeerId,
    schedule: Schedule,
    start_time: Option<Millis>,
    last_update: Millis,
    running: Arc<AtomicBool>,
    ticks: u64,
    broadcasts: u64,
    diagnostics: u64,
}

impl<K: Clock, S: Simulation> Authority<K, S> {
    pub fn new(config: AuthorityConfig, clock: K, simulation: S) -> Self {
        let mut schedule = Schedule::new()
            .every(Task::Tick, FixedInterval::from_rate(config.tick_rate))
            .every(Task::Broadcast, FixedInterval::from_rate(config.broadcast_rate));
        if config.stats_interval_ms > 0 {
            schedule = schedule.every(
                Task::Diagnostics,
                FixedInterval::new(config.stats_interval_ms as f64),
            );
        }
        let last_update = clock.now_ms();

        Self {
            buffer: SnapshotBuffer::new(config.backlog_ms),
            clock,
            simulation,
            config,
            peers: Vec::new(),
            next_peer_id: 1,
            schedule,
            start_time: None,
            last_update,
            running: Arc::new(AtomicBool::new(true)),
            ticks: 0,
            broadcasts: 0,
            diagnostics: 0,
        }
    }

    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    /// Starts the authority clock at zero with `initial` as its first state.
    pub fn start(&mut self, initial: SimulationState) {
        let now = self.clock.now_ms();
        self.start_time = Some(now);
        self.last_update = now;
        self.buffer.add(0, initial);
        log::info!(
            "authority started: {} ticks/s, {} broadcasts/s",
            self.config.tick_rate,
            self.config.broadcast_rate
        );
    }

    pub fn is_started(&self) -> bool {
        self.start_time.is_some()
    }

    /// Authority time, zero until started.
    pub fn now(&self) -> Millis {
        self.start_time
            .map_or(0, |start| self.clock.now_ms() - start)
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.schedule.is_cancelled()
    }

    pub fn add_connection(&mut self, connection: impl Connection + 'static) -> PeerId {
        let id = self.next_peer_id;
        self.next_peer_id += 1;
        self.peers.push(Peer {
            id,
            connection: Box::new(connection),
        });
        log::info!("receiver {id} connected");
        id
    }

    pub fn remove_connection(&mut self, id: PeerId) -> bool {
        let Some(index) = self.peers.iter().position(|p| p.id == id) else {
            return false;
        };
        let mut peer = self.peers.remove(index);
        peer.connection.close();
        log::info!("receiver {id} removed");
        true
    }

    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    pub fn buffer(&self) -> &SnapshotBuffer {
        &self.buffer
    }

    pub fn newest(&self) -> Option<&Snapshot> {
        self.buffer.newest()
    }

    pub fn state(&self) -> Option<&SimulationState> {
        self.buffer.newest().map(|s| &s.state)
    }

    /// Handles inbound traffic, then runs whichever periodic tasks came due
    /// since the previous call.
    pub fn update(&mut self) {
        if !self.running.load(Ordering::SeqCst) {
            if !self.schedule.is_cancelled() {
                self.stop();
            }
            return;
        }
        if !self.is_started() {
            return;
        }

        let local_now = self.clock.now_ms();
        let delta = local_now - self.last_update;
        self.last_update = local_now;

        self.poll_connections();

        for task in self.schedule.advance(delta) {
            match task {
                Task::Tick => self.tick(),
                Task::Broadcast => self.broadcast(),
                Task::Diagnostics => {
                    self.log_stats();
                    self.diagnostics += 1;
                }
            }
        }
    }

    /// Advances the newest state to the current authority time.
    pub fn tick(&mut self) {
        let now = self.now();
        let Some(newest) = self.buffer.newest() else {
            return;
        };

        let dt = (now - newest.time) as f64 / 1000.0;
        let next = self.simulation.advance(&newest.state, dt);
        self.buffer.add(now, next);
        self.ticks += 1;
    }

    /// Sends the newest snapshot to every receiver, dropping those whose
    /// link has closed.
    pub fn broadcast(&mut self) {
        let Some(newest) = self.buffer.newest() else {
            return;
        };
        let message = Message::snapshot(newest.time, newest.state.clone());

        self.peers.retain_mut(|peer| match peer.connection.send(message.clone()) {
            Ok(()) => true,
            Err(TransportError::Closed) => {
                log::info!("receiver {} dropped: link closed", peer.id);
                false
            }
            Err(e) => {
                log::warn!("failed to send snapshot to receiver {}: {e}", peer.id);
                true
            }
        });
        self.broadcasts += 1;
    }

    fn poll_connections(&mut self) {
        let now = self.now();

        self.peers.retain_mut(|peer| {
            while let Some(event) = peer.connection.poll_event() {
                match event {
                    ConnectionEvent::Open => log::debug!("receiver {} open", peer.id),
                    ConnectionEvent::Message(message) => handle_message(peer, message, now),
                    ConnectionEvent::Close => {
                        log::info!("receiver {} disconnected", peer.id);
                        return false;
                    }
                }
            }
            true
        });
    }

    pub fn log_stats(&self) {
        log::info!(
            "stats: buffer size {}, connections {}",
            self.buffer.len(),
            self.peers.len()
        );
    }

    pub fn stats(&self) -> AuthorityStats {
        AuthorityStats {
            time_ms: self.now(),
            buffer_size: self.buffer.len(),
            connection_count: self.peers.len(),
            ticks: self.ticks,
            broadcasts: self.broadcasts,
            diagnostics: self.diagnostics,
        }
    }

    /// Cancels every periodic task and closes all connections.
    pub fn stop(&mut self) {
        self.schedule.cancel();
        self.running.store(false, Ordering::SeqCst);
        for peer in &mut self.peers {
            peer.connection.close();
        }
        self.peers.clear();
        log::info!("authority stopped");
    }
}

fn handle_message(peer: &mut Peer, message: Message, now: Millis) {
    log::debug!("receiver {} sent {}", peer.id, message.kind.as_str());

    let reply = match message.kind {
        MessageKind::PingA => MessageKind::PingAReply,
        MessageKind::PingB => MessageKind::PingBReply,
        other => {
            log::warn!(
                "ignoring unexpected {} from receiver {}",
                other.as_str(),
                peer.id
            );
            return;
        }
    };

    if let Err(e) = peer.connection.send(Message::new(reply).stamped(now)) {
        log::warn!("failed to reply to receiver {}: {e}", peer.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::net::loopback::{self, LinkConditions};
    use crate::snapshot::Entity;

    fn counter(state: &SimulationState, dt: f64) -> SimulationState {
        let mut next = state.clone();
        if let Some(entity) = next.get_mut("a") {
            let x = entity.scalar("x").unwrap_or(0.0);
            entity.set("x", x + dt);
        }
        next
    }

    fn initial() -> SimulationState {
        SimulationState::new().with("a", Entity::new().with("x", 0.0))
    }

    #[test]
    fn ticks_at_the_configured_rate() {
        let clock = ManualClock::new(5_000);
        let mut authority = Authority::new(AuthorityConfig::default(), clock.clone(), counter);
        authority.start(initial());

        for _ in 0..1_000 {
            clock.advance(1);
            authority.update();
        }

        let stats = authority.stats();
        assert_eq!(stats.time_ms, 1_000);
        assert!((59..=60).contains(&stats.ticks), "{stats:?}");
        assert!((11..=12).contains(&stats.broadcasts), "{stats:?}");

        let newest = authority.newest().unwrap();
        let x = newest.state.get("a").and_then(|a| a.scalar("x")).unwrap();
        assert!((x - newest.time as f64 / 1000.0).abs() < 1e-9);
    }

    #[test]
    fn logs_stats_every_interval() {
        let clock = ManualClock::new(0);
        let mut authority = Authority::new(AuthorityConfig::default(), clock.clone(), counter);
        authority.start(initial());

        for _ in 0..4_999 {
            clock.advance(1);
            authority.update();
        }
        assert_eq!(authority.stats().diagnostics, 2);
    }

    #[test]
    fn zero_stats_interval_disables_diagnostics() {
        let config = AuthorityConfig {
            stats_interval_ms: 0,
            ..Default::default()
        };
        let clock = ManualClock::new(0);
        let mut authority = Authority::new(config, clock.clone(), counter);
        authority.start(initial());

        for _ in 0..100 {
            clock.advance(1);
            authority.update();
        }
        let stats = authority.stats();
        assert_eq!(stats.diagnostics, 0);
        assert!((5..=6).contains(&stats.ticks), "{stats:?}");
    }

    #[test]
    fn nothing_happens_before_start() {
        let clock = ManualClock::new(0);
        let mut authority = Authority::new(AuthorityConfig::default(), clock.clone(), counter);
        clock.advance(500);
        authority.update();
        assert_eq!(authority.now(), 0);
        assert!(authority.newest().is_none());
        assert_eq!(authority.stats().ticks, 0);
    }

    #[test]
    fn answers_pings_with_its_clock() {
        let clock = ManualClock::new(100);
        let mut authority = Authority::new(AuthorityConfig::default(), clock.clone(), counter);
        let (server_side, mut client_side) = loopback::pair(clock.clone(), LinkConditions::default());
        authority.add_connection(server_side);
        authority.start(initial());
        clock.advance(40);

        client_side.send(Message::new(MessageKind::PingB)).unwrap();
        client_side.send(Message::new(MessageKind::PingA)).unwrap();
        authority.update();

        let replies: Vec<_> = client_side
            .events()
            .filter_map(|event| match event {
                ConnectionEvent::Message(message) => Some((message.kind, message.t)),
                _ => None,
            })
            .collect();
        assert_eq!(
            replies,
            vec![
                (MessageKind::PingBReply, Some(40)),
                (MessageKind::PingAReply, Some(40)),
            ]
        );
    }

    #[test]
    fn closed_receivers_leave_the_broadcast_list() {
        let clock = ManualClock::new(0);
        let mut authority = Authority::new(AuthorityConfig::default(), clock.clone(), counter);
        let (server_a, mut client_a) = loopback::pair(clock.clone(), LinkConditions::default());
        let (server_b, _client_b) = loopback::pair(clock.clone(), LinkConditions::default());
        authority.add_connection(server_a);
        authority.add_connection(server_b);
        authority.start(initial());
        assert_eq!(authority.connection_count(), 2);

        client_a.close();
        clock.advance(1);
        authority.update();
        assert_eq!(authority.connection_count(), 1);
    }

    #[test]
    fn stop_cancels_everything() {
        let clock = ManualClock::new(0);
        let mut authority = Authority::new(AuthorityConfig::default(), clock.clone(), counter);
        let (server_side, mut client_side) = loopback::pair(clock.clone(), LinkConditions::default());
        authority.add_connection(server_side);
        authority.start(initial());

        authority.running().store(false, Ordering::SeqCst);
        authority.update();
        assert!(!authority.is_running());
        assert_eq!(authority.connection_count(), 0);

        let ticks = authority.stats().ticks;
        clock.advance(1_000);
        authority.update();
        assert_eq!(authority.stats().ticks, ticks);

        let events: Vec<_> = client_side.events().collect();
        assert_eq!(events, vec![ConnectionEvent::Open, ConnectionEvent::Close]);
    }
}
