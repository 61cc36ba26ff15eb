//! Hub and room configuration, and the room state machine.

use std::time::Duration;

use nexus_session::SessionConfig;
use serde::Serialize;

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration applied to every room the hub creates.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Number of peer slots, host included. Capped at 255 because slot
    /// 255 is the broadcast sentinel.
    pub max_peers: usize,

    /// Capacity of each of the room's two mailboxes.
    pub mailbox_size: usize,

    /// Initial value of the allow-join flag.
    pub allow_join: bool,

    /// How long a forced disconnect waits before closing the connection,
    /// so the final status packet can flush.
    pub disconnect_grace: Duration,
}

impl RoomConfig {
    /// Slot count actually used for a new room.
    pub(crate) fn slot_count(&self) -> usize {
        self.max_peers.clamp(1, usize::from(u8::MAX))
    }
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_peers: 4,
            mailbox_size: 128,
            allow_join: true,
            disconnect_grace: Duration::from_secs(1),
        }
    }
}

// ---------------------------------------------------------------------------
// HubConfig
// ---------------------------------------------------------------------------

/// Configuration for the hub and everything it spawns.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Size of the room id slot table: the maximum number of
    /// simultaneous rooms.
    pub max_rooms: usize,

    /// Capacity of each of the hub's two mailboxes.
    pub mailbox_size: usize,

    /// How long a connection may stay without a room before the
    /// watchdog closes it.
    pub lobby_timeout: Duration,

    /// Period of the watchdog sweep.
    pub sweep_interval: Duration,

    pub room: RoomConfig,
    pub session: SessionConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_rooms: 64,
            mailbox_size: 32,
            lobby_timeout: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(1),
            room: RoomConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// ```text
/// Open → Closed
/// ```
///
/// A room is `Open` from creation until it is closed, either because its
/// host left or because an explicit close was processed. `Closed` is
/// terminal: the room actor exits and the hub releases the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoomState {
    Open,
    Closed,
}

impl RoomState {
    /// Returns `true` while the room accepts traffic.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_state_is_open() {
        assert!(RoomState::Open.is_open());
        assert!(!RoomState::Closed.is_open());
    }

    #[test]
    fn test_room_state_display() {
        assert_eq!(RoomState::Open.to_string(), "Open");
        assert_eq!(RoomState::Closed.to_string(), "Closed");
    }

    #[test]
    fn test_room_config_default() {
        let config = RoomConfig::default();
        assert_eq!(config.max_peers, 4);
        assert_eq!(config.mailbox_size, 128);
        assert!(config.allow_join);
        assert_eq!(config.disconnect_grace, Duration::from_secs(1));
    }

    #[test]
    fn test_room_config_slot_count_clamps_to_wire_range() {
        let mut config = RoomConfig::default();
        config.max_peers = 0;
        assert_eq!(config.slot_count(), 1);
        config.max_peers = 1000;
        assert_eq!(config.slot_count(), 255);
    }

    #[test]
    fn test_hub_config_default() {
        let config = HubConfig::default();
        assert_eq!(config.max_rooms, 64);
        assert_eq!(config.mailbox_size, 32);
        assert_eq!(config.lobby_timeout, Duration::from_secs(1));
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
    }
}
