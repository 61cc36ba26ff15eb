//! The hub: room directory, connection registry and pre-room lifecycle.
//!
//! [`Hub`] is a cheap, cloneable handle. The state behind it is split
//! between concurrent maps (rooms, sessions, lobby) that transport tasks
//! may read and register into, and the hub actor, the only task that
//! creates rooms, dispatches joins and releases room codes.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use nexus_protocol::{
    HubRequest, JsonCodec, PeerId, PlayerState, RoomCode, RoomRequest,
    ServerPacket, StatusCategory,
};
use nexus_session::{Outbound, Seat, Session, UserPacket};
use nexus_transport::ConnectionId;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::room::{RoomCommand, spawn_room};
use crate::{HubConfig, HubSnapshot, RoomError, RoomHandle};

/// Characters room codes are drawn from. Look-alikes are left out.
const CODE_ALPHABET: &[u8] = b"0123456789abcdefghjkmnABCDEFGHJKLMN";

/// Length of a generated room code.
const CODE_LEN: usize = 3;

/// Commands sent to the hub actor through its control queue.
pub(crate) enum HubCommand {
    /// Sent by a room actor exactly once, after it closed.
    RoomUnregister { code: RoomCode, slot: usize },
    Shutdown,
}

// ---------------------------------------------------------------------------
// HubStats
// ---------------------------------------------------------------------------

/// Live and lifetime counters.
#[derive(Debug, Default)]
pub struct HubStats {
    clients: AtomicUsize,
    rooms: AtomicUsize,
    room_creations: AtomicU64,
    room_joins: AtomicU64,
    client_connections: AtomicU64,
}

impl HubStats {
    /// Currently registered connections.
    pub fn clients(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }

    /// Currently published rooms.
    pub fn rooms(&self) -> usize {
        self.rooms.load(Ordering::Relaxed)
    }

    pub fn room_creations(&self) -> u64 {
        self.room_creations.load(Ordering::Relaxed)
    }

    /// Join requests that passed the hub's checks.
    pub fn room_joins(&self) -> u64 {
        self.room_joins.load(Ordering::Relaxed)
    }

    pub fn client_connections(&self) -> u64 {
        self.client_connections.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

struct HubInner {
    config: HubConfig,
    rooms: DashMap<RoomCode, RoomHandle>,
    sessions: DashMap<ConnectionId, Arc<Session>>,
    /// Sessions without a room, with the time they entered the lobby.
    lobby: DashMap<ConnectionId, (Arc<Session>, Instant)>,
    packets: mpsc::Sender<UserPacket>,
    commands: mpsc::Sender<HubCommand>,
    stats: HubStats,
}

/// Handle to the process-wide hub.
///
/// Created once with [`Hub::spawn`] and passed to whatever needs it.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    /// Creates the hub and starts its actor on the current runtime.
    pub fn spawn(config: HubConfig) -> Self {
        let (packets_tx, packets_rx) = mpsc::channel(config.mailbox_size.max(1));
        let (commands_tx, commands_rx) = mpsc::channel(config.mailbox_size.max(1));
        let slots = vec![None; config.max_rooms];

        let hub = Self {
            inner: Arc::new(HubInner {
                config,
                rooms: DashMap::new(),
                sessions: DashMap::new(),
                lobby: DashMap::new(),
                packets: packets_tx,
                commands: commands_tx,
                stats: HubStats::default(),
            }),
        };

        let actor = HubActor {
            hub: hub.clone(),
            slots,
            codec: JsonCodec,
            packets: packets_rx,
            commands: commands_rx,
        };
        tokio::spawn(actor.run());

        hub
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> &HubStats {
        &self.inner.stats
    }

    /// Connect event: creates and registers a session for a new
    /// connection. The transport drains the returned queue.
    pub fn connect(
        &self,
        id: ConnectionId,
    ) -> (Arc<Session>, mpsc::Receiver<Outbound>) {
        let (session, outbound) = Session::open(
            id,
            self.inner.packets.clone(),
            self.inner.config.session.clone(),
        );
        self.register_client(&session);
        (session, outbound)
    }

    /// Adds a session to the connection map and the lobby.
    pub fn register_client(&self, session: &Arc<Session>) {
        let id = session.id();
        self.inner.sessions.insert(id, Arc::clone(session));
        self.inner
            .lobby
            .insert(id, (Arc::clone(session), session.connected_at()));
        self.inner.stats.clients.fetch_add(1, Ordering::Relaxed);
        self.inner
            .stats
            .client_connections
            .fetch_add(1, Ordering::Relaxed);
        tracing::info!(conn_id = %id, "client registered");
    }

    /// Removes a session from every registry and detaches it.
    ///
    /// Idempotent: returns `false`, and changes no counter, if the
    /// session was already unregistered.
    pub fn unregister_client(&self, session: &Arc<Session>) -> bool {
        let id = session.id();
        self.inner.lobby.remove(&id);
        let removed = self
            .inner
            .sessions
            .remove_if(&id, |_, s| Arc::ptr_eq(s, session))
            .is_some();
        session.detach();
        if removed {
            self.inner.stats.clients.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(conn_id = %id, name = %session.name(), "client unregistered");
        }
        removed
    }

    /// Disconnect event.
    ///
    /// A seated session is handed to its room as a forced leave; anything
    /// else is unregistered right away.
    pub async fn disconnect(&self, session: &Arc<Session>) {
        if let Some(room) = session.seat().and_then(|seat| self.room(seat.room.as_str())) {
            let leave = RoomCommand::Leave {
                session: Arc::clone(session),
                force_disconnect: true,
            };
            if room.command(leave).await.is_ok() {
                return;
            }
        }
        self.unregister_client(session);
    }

    /// Looks up a published room.
    pub fn room(&self, code: &str) -> Option<RoomHandle> {
        self.inner.rooms.get(code).map(|r| r.value().clone())
    }

    pub fn session(&self, id: ConnectionId) -> Option<Arc<Session>> {
        self.inner.sessions.get(&id).map(|s| Arc::clone(s.value()))
    }

    /// Returns `true` if the connection is tracked as having no room.
    pub fn in_lobby(&self, id: ConnectionId) -> bool {
        self.inner.lobby.contains_key(&id)
    }

    /// Codes of every published room.
    pub fn room_codes(&self) -> Vec<RoomCode> {
        self.inner.rooms.iter().map(|r| r.key().clone()).collect()
    }

    /// Closes a room without disconnecting its peers; they return to
    /// the lobby.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if no room has this code,
    /// [`RoomError::Unavailable`] if it is already shutting down.
    pub async fn close_room(&self, code: &str) -> Result<(), RoomError> {
        let room = self
            .room(code)
            .ok_or_else(|| RoomError::NotFound(code.to_owned()))?;
        room.command(RoomCommand::Close {
            unregister_sessions: false,
        })
        .await
    }

    /// Closes every room, disconnecting all seated peers, then stops the
    /// hub actor.
    pub async fn shutdown(&self) {
        let rooms: Vec<RoomHandle> =
            self.inner.rooms.iter().map(|r| r.value().clone()).collect();
        tracing::info!(rooms = rooms.len(), "hub shutting down");
        for room in rooms {
            let close = RoomCommand::Close {
                unregister_sessions: true,
            };
            if let Err(e) = room.command(close).await {
                tracing::debug!(room = %room.code(), error = %e, "room already gone");
            }
        }
        let _ = self.inner.commands.send(HubCommand::Shutdown).await;
    }

    /// A read-only view of the directory and counters.
    pub fn snapshot(&self) -> HubSnapshot {
        HubSnapshot::capture(
            &self.inner.stats,
            self.inner.rooms.iter().map(|r| r.value().clone()),
            self.inner.sessions.iter().map(|s| Arc::clone(s.value())),
        )
    }

    // -- used by room actors ----------------------------------------------

    pub(crate) fn leave_lobby(&self, id: ConnectionId) {
        self.inner.lobby.remove(&id);
    }

    /// Puts a session that lost its seat back under the watchdog, with a
    /// fresh timestamp.
    pub(crate) fn return_to_lobby(&self, session: &Arc<Session>) {
        if session.is_attached() && self.inner.sessions.contains_key(&session.id()) {
            self.inner
                .lobby
                .insert(session.id(), (Arc::clone(session), Instant::now()));
        }
    }

    pub(crate) async fn unregister_room(&self, code: RoomCode, slot: usize) {
        let cmd = HubCommand::RoomUnregister { code, slot };
        if self.inner.commands.send(cmd).await.is_err() {
            tracing::debug!("hub stopped, room unregister dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// HubActor
// ---------------------------------------------------------------------------

enum Step {
    Command(HubCommand),
    Packet(UserPacket),
    Sweep,
}

/// The hub actor. The only writer of the room directory and slot table.
struct HubActor {
    hub: Hub,
    /// Room id slot table; a room's slot is its small integer id.
    slots: Vec<Option<RoomCode>>,
    codec: JsonCodec,
    packets: mpsc::Receiver<UserPacket>,
    commands: mpsc::Receiver<HubCommand>,
}

impl HubActor {
    async fn run(mut self) {
        let period = self
            .hub
            .inner
            .config
            .sweep_interval
            .max(Duration::from_millis(1));
        let mut sweep = tokio::time::interval_at(Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(max_rooms = self.slots.len(), "hub actor started");
        loop {
            let step = tokio::select! {
                biased;
                Some(cmd) = self.commands.recv() => Step::Command(cmd),
                Some(packet) = self.packets.recv() => Step::Packet(packet),
                _ = sweep.tick() => Step::Sweep,
            };
            let stop = matches!(step, Step::Command(HubCommand::Shutdown));

            if panic::catch_unwind(AssertUnwindSafe(|| self.handle(step))).is_err() {
                tracing::error!("hub handler panicked, continuing");
            }
            if stop {
                break;
            }
        }
        tracing::info!("hub actor stopped");
    }

    fn handle(&mut self, step: Step) {
        match step {
            Step::Command(HubCommand::RoomUnregister { code, slot }) => {
                self.unregister_room(&code, slot);
            }
            Step::Command(HubCommand::Shutdown) => {}
            Step::Packet(UserPacket { session, msg }) => {
                self.handle_packet(&session, &msg);
            }
            Step::Sweep => self.sweep_lobby(),
        }
    }

    fn handle_packet(&mut self, session: &Arc<Session>, msg: &[u8]) {
        if !session.is_attached() || session.is_seated() {
            tracing::debug!(conn_id = %session.id(), "hub command from seated or detached session ignored");
            return;
        }
        let result = match HubRequest::decode(msg, &self.codec) {
            Ok(HubRequest::CreateRoom(req)) => self.create_room(session, req),
            Ok(HubRequest::JoinRoom(req)) => self.join_room(session, req),
            Err(e) => {
                tracing::warn!(conn_id = %session.id(), error = %e, "invalid hub packet");
                return;
            }
        };
        if let Err(e) = result {
            tracing::debug!(conn_id = %session.id(), error = %e, "request rejected");
            session.send_packet(&e.status());
        }
    }

    fn create_room(
        &mut self,
        session: &Arc<Session>,
        req: RoomRequest,
    ) -> Result<(), RoomError> {
        let rooms = &self.hub.inner.rooms;
        if req.secret.is_empty() {
            return Err(RoomError::MissingSecret);
        }
        if rooms.contains_key(req.room_code.as_str()) {
            return Err(RoomError::AlreadyExists(req.room_code));
        }
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(RoomError::CapacityReached)?;

        let code = self.generate_code();
        let room = spawn_room(
            self.hub.clone(),
            self.hub.inner.config.room.clone(),
            code.clone(),
            slot,
            &req,
            Arc::clone(session),
        );

        session.set_seat(Seat::new(code.clone(), PeerId::HOST, room.mailbox()));
        if !req.player_name.is_empty() {
            session.set_name(&req.player_name);
        }
        self.hub.leave_lobby(session.id());
        rooms.insert(code.clone(), room);
        self.slots[slot] = Some(code.clone());

        let stats = &self.hub.inner.stats;
        stats.rooms.fetch_add(1, Ordering::Relaxed);
        stats.room_creations.fetch_add(1, Ordering::Relaxed);

        let name = session.name();
        tracing::info!(room = %code, slot, app = %req.app_name, host = %name, "room created");

        session.send_packet(&ServerPacket::status(StatusCategory::Joining, 0, code.as_str()));
        session.send_packet(&ServerPacket::player(PeerId::HOST, PlayerState::SelfJoined, &name));
        session.send_packet(&ServerPacket::status(StatusCategory::Joined, 0, code.as_str()));
        Ok(())
    }

    fn join_room(
        &mut self,
        session: &Arc<Session>,
        req: RoomRequest,
    ) -> Result<(), RoomError> {
        if req.room_code.is_empty() || session.is_seated() {
            return Err(RoomError::NotFound(req.room_code));
        }
        let Some(room) = self.hub.room(&req.room_code) else {
            return Err(RoomError::NotFound(req.room_code));
        };
        if room.app_name() != req.app_name {
            return Err(RoomError::VersionMismatch(req.room_code));
        }
        if !room.allows_join() {
            return Err(RoomError::JoinDisabled(req.room_code));
        }
        if !room.secret_matches(&req.secret) {
            return Err(RoomError::InvalidSecret(req.room_code));
        }
        if !room.is_open() {
            return Err(RoomError::Closed(req.room_code));
        }

        tracing::debug!(room = %room.code(), conn_id = %session.id(), "join forwarded");
        room.try_command(RoomCommand::Join {
            session: Arc::clone(session),
            request: req,
        })?;
        self.hub
            .inner
            .stats
            .room_joins
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Releases a closed room's code and slot. Safe to repeat.
    fn unregister_room(&mut self, code: &RoomCode, slot: usize) {
        let removed = self
            .hub
            .inner
            .rooms
            .remove_if(code, |_, room| room.slot() == slot)
            .is_some();
        if let Some(entry) = self.slots.get_mut(slot) {
            if entry.as_ref() == Some(code) {
                *entry = None;
            }
        }
        if removed {
            self.hub.inner.stats.rooms.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(room = %code, slot, "room unregistered");
        }
    }

    /// Watchdog tick: forgets sessions that found a room and forces off
    /// the ones that waited too long.
    ///
    /// An expired session is closed and unregistered right away, so a
    /// client that never answers the close cannot keep its registration.
    fn sweep_lobby(&mut self) {
        let now = Instant::now();
        let timeout = self.hub.inner.config.lobby_timeout;
        let mut expired = Vec::new();
        self.hub.inner.lobby.retain(|_, (session, since)| {
            if session.is_seated() {
                return false;
            }
            if now.duration_since(*since) <= timeout {
                return true;
            }
            expired.push(Arc::clone(session));
            false
        });

        // Unregistering touches the lobby map, so it runs after `retain`
        // has released its shard locks.
        for session in expired {
            if session.is_seated() {
                continue;
            }
            if session.close() {
                tracing::info!(conn_id = %session.id(), "no room before deadline, closing connection");
            }
            self.hub.unregister_client(&session);
        }
    }

    fn generate_code(&self) -> RoomCode {
        let mut rng = rand::rng();
        loop {
            let code: String = (0..CODE_LEN)
                .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
                .collect();
            if !self.hub.inner.rooms.contains_key(code.as_str()) {
                return RoomCode::new(code);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_code_uses_alphabet_and_length() {
        let hub = Hub::spawn(HubConfig::default());
        let (_tx, packets) = mpsc::channel(1);
        let (_ctx, commands) = mpsc::channel(1);
        let actor = HubActor {
            hub,
            slots: vec![None; 1],
            codec: JsonCodec,
            packets,
            commands,
        };
        for _ in 0..50 {
            let code = actor.generate_code();
            assert_eq!(code.as_str().len(), CODE_LEN);
            assert!(code.as_str().bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[tokio::test]
    async fn test_unregister_client_twice_decrements_once() {
        let hub = Hub::spawn(HubConfig::default());
        let (session, _out) = hub.connect(ConnectionId::new(1));
        assert_eq!(hub.stats().clients(), 1);
        assert!(hub.in_lobby(session.id()));

        assert!(hub.unregister_client(&session));
        assert!(!hub.unregister_client(&session));
        assert_eq!(hub.stats().clients(), 0);
        assert_eq!(hub.stats().client_connections(), 1);
        assert!(!hub.in_lobby(session.id()));
        assert!(!session.is_attached());
    }

    #[tokio::test]
    async fn test_return_to_lobby_skips_unregistered_session() {
        let hub = Hub::spawn(HubConfig::default());
        let (session, _out) = hub.connect(ConnectionId::new(2));
        hub.unregister_client(&session);
        hub.return_to_lobby(&session);
        assert!(!hub.in_lobby(session.id()));
    }

    #[tokio::test]
    async fn test_close_room_unknown_code_returns_not_found() {
        let hub = Hub::spawn(HubConfig::default());
        assert_eq!(
            hub.close_room("zzz").await,
            Err(RoomError::NotFound("zzz".into()))
        );
    }
}
