//! The per-connection session.
//!
//! A [`Session`] is the server's record of one live connection. It tracks:
//! - WHO is connected (`ConnectionId`, display name, connect time)
//! - WHERE they sit (an optional [`Seat`] in a room)
//! - HOW to reach them (the outbound queue drained by the transport)
//! - HOW to reach the hub (the hub's data mailbox)
//!
//! Sessions are shared (`Arc`) between the hub's connection map and the
//! room they sit in. The hub and room actors are the only writers of the
//! seat and name; transport callbacks only call [`Session::receive`],
//! [`Session::send`] and the hub's register/unregister helpers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nexus_protocol::{ClientFrame, PeerId, RoomCode, ServerPacket};
use nexus_transport::ConnectionId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;

use crate::SessionError;

/// Display name used until a create or join request provides one.
pub const DEFAULT_NAME: &str = "Player";

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for per-connection behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of each session's outbound queue. When a slow client lets
    /// the queue fill up, further frames to it are dropped.
    pub outbound_capacity: usize,

    /// Artificial latency applied to every inbound and outbound frame.
    /// `None` in production; set it to test clients under lag.
    pub send_delay: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            send_delay: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Mailbox messages
// ---------------------------------------------------------------------------

/// An instruction for the task that owns the write half of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write one frame.
    Frame(Vec<u8>),
    /// Close the connection after everything queued before it.
    Close,
}

/// A frame a session forwards to the hub's or a room's data mailbox.
///
/// `msg` is the frame with its top-level opcode byte stripped.
#[derive(Debug)]
pub struct UserPacket {
    pub session: Arc<Session>,
    pub msg: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Seat
// ---------------------------------------------------------------------------

/// A session's place in a room.
///
/// Room, slot and host flag live in one value, so a session either has
/// all of them or none. The mailbox is a weak sender: the session can
/// reach the room while it runs but never keeps it alive.
#[derive(Debug, Clone)]
pub struct Seat {
    pub room: RoomCode,
    pub peer: PeerId,
    pub is_host: bool,
    mailbox: mpsc::WeakSender<UserPacket>,
}

impl Seat {
    /// Creates a seat in `room` at slot `peer`. Only slot 0 is the host.
    pub fn new(
        room: RoomCode,
        peer: PeerId,
        mailbox: &mpsc::Sender<UserPacket>,
    ) -> Self {
        Self {
            room,
            peer,
            is_host: peer.is_host(),
            mailbox: mailbox.downgrade(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionStats
// ---------------------------------------------------------------------------

/// Traffic counters for one session.
#[derive(Debug, Default)]
pub struct SessionStats {
    packets_in: AtomicU64,
    packets_out: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

impl SessionStats {
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
// Session
// ---------------------------------------------------------------------------

/// One live connection.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    connected_at: Instant,
    config: SessionConfig,
    /// Cleared on teardown; sends after that are dropped.
    transport: Mutex<Option<mpsc::Sender<Outbound>>>,
    hub: Mutex<Option<mpsc::Sender<UserPacket>>>,
    seat: Mutex<Option<Seat>>,
    name: Mutex<String>,
    stats: SessionStats,
}

impl Session {
    /// Creates a session together with the receiving end of its outbound
    /// queue. The transport adapter drains the receiver into the socket.
    pub fn open(
        id: ConnectionId,
        hub: mpsc::Sender<UserPacket>,
        config: SessionConfig,
    ) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(config.outbound_capacity.max(1));
        let session = Arc::new(Self {
            id,
            connected_at: Instant::now(),
            config,
            transport: Mutex::new(Some(tx)),
            hub: Mutex::new(Some(hub)),
            seat: Mutex::new(None),
            name: Mutex::new(DEFAULT_NAME.to_owned()),
            stats: SessionStats::default(),
        });
        (session, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn name(&self) -> String {
        lock(&self.name).clone()
    }

    pub fn set_name(&self, name: &str) {
        *lock(&self.name) = name.to_owned();
    }

    /// Returns a copy of the current seat, if any.
    pub fn seat(&self) -> Option<Seat> {
        lock(&self.seat).clone()
    }

    pub fn is_seated(&self) -> bool {
        lock(&self.seat).is_some()
    }

    /// Places the session in a room. Called by the hub (host at creation)
    /// or the room actor (joiners).
    pub fn set_seat(&self, seat: Seat) {
        *lock(&self.seat) = Some(seat);
    }

    /// Detaches the session from its room and returns the old seat.
    pub fn clear_seat(&self) -> Option<Seat> {
        lock(&self.seat).take()
    }

    /// Returns `true` while the transport handle is still held.
    pub fn is_attached(&self) -> bool {
        lock(&self.transport).is_some()
    }

    /// Queues a frame for delivery.
    ///
    /// Best effort: once the transport handle has been cleared, or when
    /// the outbound queue is full, the frame is dropped without error.
    pub fn send(&self, frame: Vec<u8>) {
        let Some(tx) = lock(&self.transport).clone() else {
            tracing::trace!(conn_id = %self.id, "send after teardown, dropped");
            return;
        };
        self.stats.record_out(frame.len());
        match self.config.send_delay {
            None => push(self.id, &tx, Outbound::Frame(frame)),
            Some(delay) => {
                let id = self.id;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    push(id, &tx, Outbound::Frame(frame));
                });
            }
        }
    }

    /// Encodes and queues a server packet.
    pub fn send_packet(&self, packet: &ServerPacket) {
        self.send(packet.encode());
    }

    /// Asks the transport to close the connection.
    ///
    /// Check-then-close: does nothing once the session is detached.
    /// Returns `true` if a close was queued.
    pub fn close(&self) -> bool {
        let Some(tx) = lock(&self.transport).clone() else {
            return false;
        };
        // Close must not be lost to a full queue.
        tokio::spawn(async move {
            let _ = tx.send(Outbound::Close).await;
        });
        true
    }

    /// Clears the seat, the hub link and the transport handle.
    ///
    /// Returns `true` if the session was still attached. Calling it again
    /// is a no-op.
    pub fn detach(&self) -> bool {
        lock(&self.seat).take();
        lock(&self.hub).take();
        lock(&self.transport).take().is_some()
    }

    /// Handles one inbound frame from the transport.
    ///
    /// Dispatches on byte 0: hub commands go to the hub mailbox, room
    /// traffic to the seated room's mailbox, echo frames straight back.
    /// Waits only for space in a bounded mailbox, so a slow actor slows
    /// this connection and nobody else.
    ///
    /// # Errors
    /// Protocol errors for undecodable frames, [`SessionError::NotInRoom`]
    /// for room traffic without a seat, [`SessionError::Detached`] and
    /// [`SessionError::MailboxClosed`] during teardown. All of them mean
    /// "drop the frame, keep the connection".
    pub async fn receive(
        self: &Arc<Self>,
        frame: Vec<u8>,
    ) -> Result<(), SessionError> {
        let Some(delay) = self.config.send_delay else {
            return self.dispatch(frame).await;
        };
        let session = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = session.dispatch(frame).await {
                tracing::debug!(
                    conn_id = %session.id,
                    error = %e,
                    "delayed frame dropped"
                );
            }
        });
        Ok(())
    }

    async fn dispatch(self: &Arc<Self>, frame: Vec<u8>) -> Result<(), SessionError> {
        self.stats.record_in(frame.len());
        let decoded = ClientFrame::decode(&frame)?;
        match decoded {
            ClientFrame::Hub(body) => {
                let msg = body.to_vec();
                let hub = lock(&self.hub).clone().ok_or(SessionError::Detached)?;
                hub.send(UserPacket {
                    session: Arc::clone(self),
                    msg,
                })
                .await
                .map_err(|_| SessionError::MailboxClosed)
            }
            ClientFrame::Room(body) => {
                let msg = body.to_vec();
                let mailbox = lock(&self.seat)
                    .as_ref()
                    .and_then(|seat| seat.mailbox.upgrade())
                    .ok_or(SessionError::NotInRoom)?;
                mailbox
                    .send(UserPacket {
                        session: Arc::clone(self),
                        msg,
                    })
                    .await
                    .map_err(|_| SessionError::MailboxClosed)
            }
            ClientFrame::Echo => {
                tracing::debug!(conn_id = %self.id, "echoing frame");
                self.send(frame);
                Ok(())
            }
        }
    }
}

fn push(id: ConnectionId, tx: &mpsc::Sender<Outbound>, out: Outbound) {
    match tx.try_send(out) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            tracing::debug!(conn_id = %id, "outbound queue full, frame dropped");
        }
        Err(TrySendError::Closed(_)) => {
            tracing::trace!(conn_id = %id, "outbound queue closed, frame dropped");
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
