//! Room actor: an isolated Tokio task that owns one game session.
//!
//! Each room runs in its own task and owns its peer slot array. The
//! outside world reaches it through two bounded mailboxes: a control
//! queue (join, leave, close) and a data queue (frames from seated
//! sessions). Control is always drained first.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use nexus_protocol::{
    PeerId, PlayerState, RoomCode, RoomFrame, RoomRequest, ServerPacket,
    StatusCategory, status_code,
};
use nexus_session::{Seat, Session, UserPacket};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;

use crate::{Hub, RoomConfig, RoomError, RoomState};

/// Commands sent to a room actor through its control queue.
pub(crate) enum RoomCommand {
    /// Seat a session that passed the hub's checks.
    Join {
        session: Arc<Session>,
        request: RoomRequest,
    },

    /// Remove a session. Forced leaves also close its connection after
    /// the grace delay.
    Leave {
        session: Arc<Session>,
        force_disconnect: bool,
    },

    /// Close the room.
    Close { unregister_sessions: bool },
}

// ---------------------------------------------------------------------------
// RoomStats
// ---------------------------------------------------------------------------

/// Traffic counters for one room.
#[derive(Debug, Default)]
pub struct RoomStats {
    packets_in: AtomicU64,
    packets_out: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

impl RoomStats {
    fn record_in(&self, len: usize) {
        self.packets_in.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(len as u64, Ordering::Relaxed);
    }

    fn record_out(&self, len: usize) {
        self.packets_out.fetch_add(1, Ordering::Relaxed);
        self.bytes_out.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn packets_in(&self) -> u64 {
        self.packets_in.load(Ordering::Relaxed)
    }

    pub fn packets_out(&self) -> u64 {
        self.packets_out.load(Ordering::Relaxed)
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// RoomHandle
// ---------------------------------------------------------------------------

/// Everything about a room that is visible outside its actor.
#[derive(Debug)]
struct RoomShared {
    code: RoomCode,
    slot: usize,
    secret: String,
    app_name: String,
    created_at: Instant,
    /// Written only by the room actor.
    open: AtomicBool,
    /// Written only by the room actor.
    allow_join: AtomicBool,
    stats: RoomStats,
    packets: mpsc::Sender<UserPacket>,
    commands: mpsc::Sender<RoomCommand>,
}

/// Handle to a running room actor.
///
/// Cheap to clone. The hub directory holds one per room; the hub reads
/// the flags for its join pre-checks and forwards commands through it.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    shared: Arc<RoomShared>,
}

impl RoomHandle {
    pub fn code(&self) -> &RoomCode {
        &self.shared.code
    }

    /// Index of this room in the hub's room slot table.
    pub fn slot(&self) -> usize {
        self.shared.slot
    }

    pub fn app_name(&self) -> &str {
        &self.shared.app_name
    }

    pub fn created_at(&self) -> Instant {
        self.shared.created_at
    }

    pub fn stats(&self) -> &RoomStats {
        &self.shared.stats
    }

    pub fn state(&self) -> RoomState {
        if self.is_open() {
            RoomState::Open
        } else {
            RoomState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    pub fn allows_join(&self) -> bool {
        self.shared.allow_join.load(Ordering::Acquire)
    }

    pub fn secret_matches(&self, secret: &str) -> bool {
        self.shared.secret == secret
    }

    /// The data mailbox seated sessions send their room traffic to.
    pub(crate) fn mailbox(&self) -> &mpsc::Sender<UserPacket> {
        &self.shared.packets
    }

    /// Queues a control command without waiting. Used by the hub actor,
    /// which must never block on a room.
    pub(crate) fn try_command(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.shared
            .commands
            .try_send(cmd)
            .map_err(|_| RoomError::Unavailable(self.shared.code.clone()))
    }

    /// Queues a control command, waiting for space.
    pub(crate) async fn command(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.shared
            .commands
            .send(cmd)
            .await
            .map_err(|_| RoomError::Unavailable(self.shared.code.clone()))
    }
}

// ---------------------------------------------------------------------------
// RoomActor
// ---------------------------------------------------------------------------

enum Step {
    Command(RoomCommand),
    Packet(UserPacket),
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    shared: Arc<RoomShared>,
    config: RoomConfig,
    hub: Hub,
    /// Slot 0 is the host.
    peers: Vec<Option<Arc<Session>>>,
    packets: mpsc::Receiver<UserPacket>,
    commands: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Runs the actor loop until the room closes.
    async fn run(mut self) {
        let code = self.shared.code.clone();
        tracing::info!(room = %code, "room actor started");

        loop {
            let step = tokio::select! {
                biased;
                Some(cmd) = self.commands.recv() => Step::Command(cmd),
                Some(packet) = self.packets.recv() => Step::Packet(packet),
                else => break,
            };

            match panic::catch_unwind(AssertUnwindSafe(|| self.handle(step))) {
                Ok(false) => {}
                Ok(true) => break,
                Err(_) => {
                    tracing::error!(room = %code, "room handler panicked, closing room");
                    break;
                }
            }
        }

        // Every exit path releases the code and slot.
        if self.shared.open.load(Ordering::Acquire) {
            let closed = panic::catch_unwind(AssertUnwindSafe(|| self.close_room(true)));
            if closed.is_err() {
                self.shared.open.store(false, Ordering::Release);
                tracing::error!(room = %code, "room close panicked");
            }
        }
        self.drain_commands();
        self.hub.unregister_room(code.clone(), self.shared.slot).await;

        tracing::info!(room = %code, "room actor stopped");
    }

    /// Refuses further commands and settles the ones already queued.
    ///
    /// A disconnect can queue its forced leave behind the command that
    /// closed the room; that session still has to be unregistered.
    fn drain_commands(&mut self) {
        self.commands.close();
        while let Ok(cmd) = self.commands.try_recv() {
            match cmd {
                RoomCommand::Leave {
                    session,
                    force_disconnect: true,
                } => {
                    tracing::debug!(
                        room = %self.shared.code,
                        conn_id = %session.id(),
                        "disconnect queued behind close"
                    );
                    schedule_disconnect(&self.hub, &session, self.config.disconnect_grace);
                }
                RoomCommand::Join { session, .. } => {
                    session.send_packet(&RoomError::Closed(self.shared.code.to_string()).status());
                }
                RoomCommand::Leave { .. } | RoomCommand::Close { .. } => {}
            }
        }
    }

    /// Handles one mailbox item. Returns `true` when the loop must stop.
    fn handle(&mut self, step: Step) -> bool {
        match step {
            Step::Command(RoomCommand::Join { session, request }) => {
                self.user_join(&session, &request);
                false
            }
            Step::Command(RoomCommand::Leave {
                session,
                force_disconnect,
            }) => self.user_leave(&session, force_disconnect),
            Step::Command(RoomCommand::Close {
                unregister_sessions,
            }) => {
                self.close_room(unregister_sessions);
                true
            }
            Step::Packet(UserPacket { session, msg }) => {
                self.handle_packet(&session, &msg);
                false
            }
        }
    }

    fn index_of(&self, session: &Arc<Session>) -> Option<usize> {
        self.peers
            .iter()
            .position(|p| p.as_ref().is_some_and(|p| Arc::ptr_eq(p, session)))
    }

    fn user_join(&mut self, session: &Arc<Session>, request: &RoomRequest) {
        let code = &self.shared.code;
        // A second join can be queued before the first is processed, and
        // a session can disconnect while its join waits in the queue.
        if session.is_seated() || !session.is_attached() {
            tracing::debug!(
                room = %code,
                conn_id = %session.id(),
                "stale or duplicate join ignored"
            );
            return;
        }

        let Some(idx) = self.peers.iter().position(Option::is_none) else {
            tracing::debug!(room = %code, conn_id = %session.id(), "room full");
            session.send_packet(&RoomError::RoomFull(code.clone()).status());
            return;
        };
        let peer = peer_at(idx);

        session.set_seat(Seat::new(code.clone(), peer, &self.shared.packets));
        if !request.player_name.is_empty() {
            session.set_name(&request.player_name);
        }
        self.peers[idx] = Some(Arc::clone(session));
        self.hub.leave_lobby(session.id());

        let name = session.name();
        tracing::info!(room = %code, %peer, %name, "peer joined");

        session.send_packet(&ServerPacket::status(
            StatusCategory::Joining,
            0,
            format!("joining room:{code}"),
        ));
        session.send_packet(&ServerPacket::player(peer, PlayerState::SelfJoined, &name));
        self.send_packet(
            peer,
            PeerId::BROADCAST,
            &ServerPacket::player(peer, PlayerState::Present, &name).encode(),
            peer,
        );
        for (other_idx, other) in self.peers.iter().enumerate() {
            let Some(other) = other else { continue };
            if other_idx == idx {
                continue;
            }
            session.send_packet(&ServerPacket::player(
                peer_at(other_idx),
                PlayerState::Present,
                &other.name(),
            ));
        }
        session.send_packet(&ServerPacket::status(
            StatusCategory::Joined,
            0,
            code.as_str(),
        ));
    }

    /// Removes a session. Returns `true` if the host left and the room
    /// closed.
    fn user_leave(&mut self, session: &Arc<Session>, force_disconnect: bool) -> bool {
        let Some(idx) = self.index_of(session) else {
            if force_disconnect {
                // Already gone from the roster, e.g. through a leave frame
                // processed first. The connection is still going away.
                schedule_disconnect(&self.hub, session, self.config.disconnect_grace);
            } else {
                session.send_packet(&RoomError::NotInRoom.status());
            }
            return false;
        };
        if idx == 0 {
            tracing::info!(room = %self.shared.code, "host left");
            self.close_room(true);
            return true;
        }

        let peer = peer_at(idx);
        self.peers[idx] = None;
        session.clear_seat();
        let name = session.name();
        tracing::info!(room = %self.shared.code, %peer, %name, force_disconnect, "peer left");

        session.send_packet(&ServerPacket::status(
            StatusCategory::Notice,
            status_code::CLOSED,
            "room left",
        ));
        self.send_packet(
            PeerId::BROADCAST,
            PeerId::BROADCAST,
            &ServerPacket::player(peer, PlayerState::Left, &name).encode(),
            PeerId::BROADCAST,
        );

        if force_disconnect {
            schedule_disconnect(&self.hub, session, self.config.disconnect_grace);
        } else {
            self.hub.return_to_lobby(session);
        }
        false
    }

    /// Detaches and notifies every peer. Runs at most once per room.
    fn close_room(&mut self, unregister_sessions: bool) {
        if !self.shared.open.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::info!(room = %self.shared.code, unregister_sessions, "closing room");

        let closing = ServerPacket::status(
            StatusCategory::Notice,
            status_code::CLOSED,
            "room closing",
        );
        for slot in &mut self.peers {
            let Some(peer) = slot.take() else { continue };
            peer.clear_seat();
            peer.send_packet(&closing);
            if unregister_sessions {
                schedule_disconnect(&self.hub, &peer, self.config.disconnect_grace);
            } else {
                self.hub.return_to_lobby(&peer);
            }
        }
    }

    /// Delivers `frame` to `dest`, or to every peer except `origin` and
    /// `except` when `dest` is the broadcast sentinel.
    fn send_packet(&self, origin: PeerId, dest: PeerId, frame: &[u8], except: PeerId) {
        if !self.shared.open.load(Ordering::Acquire) {
            return;
        }
        if dest.is_broadcast() {
            for (idx, peer) in self.peers.iter().enumerate() {
                let Some(peer) = peer else { continue };
                if idx == origin.index() || idx == except.index() {
                    continue;
                }
                self.deliver(peer, frame);
            }
            return;
        }
        match self.peers.get(dest.index()) {
            Some(Some(peer)) => self.deliver(peer, frame),
            Some(None) => {
                tracing::debug!(room = %self.shared.code, %origin, %dest, "empty destination slot");
            }
            None => {
                tracing::debug!(room = %self.shared.code, %origin, %dest, "destination out of range");
            }
        }
    }

    fn deliver(&self, peer: &Session, frame: &[u8]) {
        self.shared.stats.record_out(frame.len());
        peer.send(frame.to_vec());
    }

    /// Applies the relay-authority policy to one frame from a seated peer.
    fn handle_packet(&mut self, session: &Arc<Session>, msg: &[u8]) {
        let code = &self.shared.code;
        self.shared.stats.record_in(msg.len());

        let Some(origin) = self.index_of(session).map(peer_at) else {
            tracing::debug!(room = %code, conn_id = %session.id(), "packet from non-member dropped");
            return;
        };

        match RoomFrame::decode(msg) {
            Ok(RoomFrame::PeerPacket {
                dest,
                except,
                payload,
            }) => {
                if !origin.is_host() && !dest.is_host() {
                    tracing::warn!(
                        room = %code,
                        %origin,
                        %dest,
                        "non-host may only target the host, packet dropped"
                    );
                    return;
                }
                let envelope = ServerPacket::Relay {
                    origin,
                    dest,
                    payload: payload.to_vec(),
                }
                .encode();
                self.send_packet(origin, dest, &envelope, except);
            }
            Ok(RoomFrame::Leave) => {
                let cmd = RoomCommand::Leave {
                    session: Arc::clone(session),
                    force_disconnect: false,
                };
                match self.shared.commands.try_send(cmd) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(room = %code, %origin, "control queue full, leave dropped");
                    }
                    Err(TrySendError::Closed(_)) => {}
                }
            }
            Ok(RoomFrame::SetAllowJoin(allow)) if origin.is_host() => {
                self.shared.allow_join.store(allow, Ordering::Release);
                tracing::info!(room = %code, allow, "allow-join changed");
                let message = if allow { "allow join on" } else { "allow join off" };
                session.send_packet(&ServerPacket::status(StatusCategory::Admin, 0, message));
            }
            Ok(RoomFrame::SetAllowJoin(_)) => {
                tracing::warn!(room = %code, %origin, "allow-join toggle from non-host dropped");
            }
            Err(e) => {
                tracing::warn!(room = %code, %origin, error = %e, "invalid room packet");
            }
        }
    }
}

/// Slot indices are bounded by [`RoomConfig::slot_count`], so they always
/// fit the wire byte below the broadcast sentinel.
fn peer_at(idx: usize) -> PeerId {
    PeerId(u8::try_from(idx).unwrap_or(u8::MAX))
}

/// Closes `session`'s connection and unregisters it after `grace`.
///
/// Both steps tolerate the session having been torn down in the meantime.
pub(crate) fn schedule_disconnect(hub: &Hub, session: &Arc<Session>, grace: Duration) {
    let hub = hub.clone();
    let session = Arc::clone(session);
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        session.close();
        hub.unregister_client(&session);
    });
}

/// Spawns a room actor with `host` in slot 0 and returns its handle.
///
/// The caller seats the host and publishes the handle.
pub(crate) fn spawn_room(
    hub: Hub,
    config: RoomConfig,
    code: RoomCode,
    slot: usize,
    request: &RoomRequest,
    host: Arc<Session>,
) -> RoomHandle {
    let (packets_tx, packets_rx) = mpsc::channel(config.mailbox_size.max(1));
    let (commands_tx, commands_rx) = mpsc::channel(config.mailbox_size.max(1));

    let shared = Arc::new(RoomShared {
        code,
        slot,
        secret: request.secret.clone(),
        app_name: request.app_name.clone(),
        created_at: Instant::now(),
        open: AtomicBool::new(true),
        allow_join: AtomicBool::new(config.allow_join),
        stats: RoomStats::default(),
        packets: packets_tx,
        commands: commands_tx,
    });

    let mut peers = vec![None; config.slot_count()];
    peers[0] = Some(host);

    let actor = RoomActor {
        shared: Arc::clone(&shared),
        config,
        hub,
        peers,
        packets: packets_rx,
        commands: commands_rx,
    };
    tokio::spawn(actor.run());

    RoomHandle { shared }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HubConfig;
    use nexus_transport::ConnectionId;

    fn quick_config() -> RoomConfig {
        RoomConfig {
            disconnect_grace: Duration::from_millis(10),
            ..RoomConfig::default()
        }
    }

    async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_user_leave_forced_for_non_member_unregisters_session() {
        let hub = Hub::spawn(HubConfig::default());
        let (host, _host_out) = hub.connect(ConnectionId::new(1));
        let (guest, _guest_out) = hub.connect(ConnectionId::new(2));
        let room = spawn_room(
            hub.clone(),
            quick_config(),
            RoomCode::new("abc"),
            0,
            &RoomRequest::default(),
            host,
        );

        // The guest already left through a leave frame; its disconnect
        // arrives afterwards.
        room.command(RoomCommand::Leave {
            session: Arc::clone(&guest),
            force_disconnect: true,
        })
        .await
        .unwrap();

        assert!(wait_for(|| hub.session(guest.id()).is_none()).await);
        assert!(!guest.is_attached());
        assert!(room.is_open());
    }

    #[tokio::test]
    async fn test_user_leave_non_member_reports_not_in_room() {
        let hub = Hub::spawn(HubConfig::default());
        let (host, _host_out) = hub.connect(ConnectionId::new(1));
        let (guest, mut guest_out) = hub.connect(ConnectionId::new(2));
        let room = spawn_room(
            hub.clone(),
            quick_config(),
            RoomCode::new("abc"),
            0,
            &RoomRequest::default(),
            host,
        );

        room.command(RoomCommand::Leave {
            session: Arc::clone(&guest),
            force_disconnect: false,
        })
        .await
        .unwrap();

        let reply = guest_out.recv().await.unwrap();
        assert_eq!(reply, nexus_session::Outbound::Frame(RoomError::NotInRoom.status().encode()));
        assert!(hub.session(guest.id()).is_some());
    }

    #[tokio::test]
    async fn test_forced_leave_queued_behind_close_unregisters_session() {
        let hub = Hub::spawn(HubConfig::default());
        let (host, _host_out) = hub.connect(ConnectionId::new(1));
        let (guest, _guest_out) = hub.connect(ConnectionId::new(2));
        let room = spawn_room(
            hub.clone(),
            quick_config(),
            RoomCode::new("abc"),
            0,
            &RoomRequest::default(),
            host,
        );

        room.try_command(RoomCommand::Close {
            unregister_sessions: false,
        })
        .unwrap();
        room.try_command(RoomCommand::Leave {
            session: Arc::clone(&guest),
            force_disconnect: true,
        })
        .unwrap();

        assert!(wait_for(|| hub.session(guest.id()).is_none()).await);
        assert!(!room.is_open());
        assert!(room.try_command(RoomCommand::Close { unregister_sessions: true }).is_err());
    }

    #[test]
    fn test_peer_at_maps_slot_index() {
        assert_eq!(peer_at(0), PeerId::HOST);
        assert_eq!(peer_at(3), PeerId(3));
    }

    #[test]
    fn test_room_stats_record() {
        let stats = RoomStats::default();
        stats.record_in(10);
        stats.record_out(4);
        stats.record_out(6);
        assert_eq!(stats.packets_in(), 1);
        assert_eq!(stats.bytes_in(), 10);
        assert_eq!(stats.packets_out(), 2);
        assert_eq!(stats.bytes_out(), 10);
    }
}
