//! Core protocol types shared by every layer of the relay.
//!
//! These are the values that appear inside frames on the wire: peer slot
//! numbers, room codes, the JSON body of create/join requests, and the
//! small enums carried in server-to-client packets.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A peer's slot index inside a room.
///
/// Newtype over the single byte the wire format uses for origin and
/// destination fields. Slot 0 is always the host; 255 is reserved as the
/// broadcast sentinel and never names a real slot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct PeerId(pub u8);

impl PeerId {
    /// The host's slot.
    pub const HOST: PeerId = PeerId(0);

    /// Destination meaning "every peer in the room".
    pub const BROADCAST: PeerId = PeerId(255);

    /// Returns `true` for the host slot.
    pub fn is_host(self) -> bool {
        self == Self::HOST
    }

    /// Returns `true` for the broadcast sentinel.
    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }

    /// The slot index this peer id refers to.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// The short code a room is published under in the hub directory.
///
/// `Borrow<str>` lets directories keyed by `RoomCode` be queried with a
/// plain `&str` taken from a join request.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Wraps an already generated code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RoomCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// RoomRequest: the JSON body of create/join commands
// ---------------------------------------------------------------------------

/// Parameters of a create-room or join-room request.
///
/// Field names match the JSON clients send. Missing fields decode as empty
/// strings (`#[serde(default)]`) so the hub can answer with a proper
/// rejection instead of silently dropping the frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomRequest {
    /// The room code to join (ignored on create unless it collides).
    #[serde(rename = "room_id")]
    pub room_code: String,

    /// The room secret.
    #[serde(rename = "room_pwd")]
    pub secret: String,

    /// Application/version tag; joins must match the room's tag exactly.
    pub app_name: String,

    /// Display name for the requesting player.
    pub player_name: String,
}

// ---------------------------------------------------------------------------
// Player state and status categories
// ---------------------------------------------------------------------------

/// The state byte of a player-state packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PlayerState {
    /// The peer left the room.
    Left = 0,
    /// The peer is present in the room.
    Present = 1,
    /// Sent to a peer about itself right after it takes a slot.
    SelfJoined = 2,
}

/// The category byte of a status packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum StatusCategory {
    /// A join or create is in progress; the message carries the room code.
    Joining = 0,
    /// A rejection or informational notice.
    Notice = 2,
    /// The join or create completed.
    Joined = 5,
    /// Acknowledgement of a host admin command.
    Admin = 111,
}

/// Sub-codes used with [`StatusCategory::Notice`].
pub mod status_code {
    /// Generic success code, also "not found / bad secret / wrong version".
    pub const NOT_FOUND: u8 = 0;
    /// The room was closed, abandoned, or left.
    pub const CLOSED: u8 = 1;
    /// Missing secret or room already created.
    pub const REJECTED: u8 = 2;
    /// The room or the hub is at capacity.
    pub const CAPACITY: u8 = 111;
}
