//! Serializable, read-only views of hub state.

use std::sync::Arc;

use nexus_protocol::{PeerId, RoomCode};
use nexus_session::Session;
use serde::Serialize;

use crate::{HubStats, RoomHandle, RoomState};

/// One published room.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub code: RoomCode,
    pub app_name: String,
    pub state: RoomState,
    pub allow_join: bool,
    pub age_secs: u64,
    pub packets_in: u64,
    pub packets_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl From<&RoomHandle> for RoomSummary {
    fn from(room: &RoomHandle) -> Self {
        let stats = room.stats();
        Self {
            code: room.code().clone(),
            app_name: room.app_name().to_owned(),
            state: room.state(),
            allow_join: room.allows_join(),
            age_secs: room.created_at().elapsed().as_secs(),
            packets_in: stats.packets_in(),
            packets_out: stats.packets_out(),
            bytes_in: stats.bytes_in(),
            bytes_out: stats.bytes_out(),
        }
    }
}

/// One registered connection.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub conn_id: u64,
    pub name: String,
    /// `None` while the session waits in the lobby.
    pub room: Option<RoomCode>,
    pub peer: Option<PeerId>,
    pub packets_in: u64,
    pub packets_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        let seat = session.seat();
        let stats = session.stats();
        Self {
            conn_id: session.id().into_inner(),
            name: session.name(),
            room: seat.as_ref().map(|s| s.room.clone()),
            peer: seat.map(|s| s.peer),
            packets_in: stats.packets_in(),
            packets_out: stats.packets_out(),
            bytes_in: stats.bytes_in(),
            bytes_out: stats.bytes_out(),
        }
    }
}

/// Directory and counters at one point in time.
///
/// Rooms are sorted by code, sessions by room and then name, with
/// lobby sessions first.
#[derive(Debug, Clone, Serialize)]
pub struct HubSnapshot {
    pub clients: usize,
    pub rooms_active: usize,
    pub room_creations: u64,
    pub room_joins: u64,
    pub client_connections: u64,
    pub rooms: Vec<RoomSummary>,
    pub sessions: Vec<SessionSummary>,
}

impl HubSnapshot {
    pub(crate) fn capture(
        stats: &HubStats,
        rooms: impl Iterator<Item = RoomHandle>,
        sessions: impl Iterator<Item = Arc<Session>>,
    ) -> Self {
        let mut rooms: Vec<RoomSummary> =
            rooms.map(|room| RoomSummary::from(&room)).collect();
        rooms.sort_by(|a, b| a.code.cmp(&b.code));

        let mut sessions: Vec<SessionSummary> = sessions
            .map(|session| SessionSummary::from(session.as_ref()))
            .collect();
        sessions.sort_by(|a, b| {
            a.room.cmp(&b.room).then_with(|| a.name.cmp(&b.name))
        });

        Self {
            clients: stats.clients(),
            rooms_active: stats.rooms(),
            room_creations: stats.room_creations(),
            room_joins: stats.room_joins(),
            client_connections: stats.client_connections(),
            rooms,
            sessions,
        }
    }
}
