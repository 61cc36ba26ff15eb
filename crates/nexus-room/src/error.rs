//! Error types for the room layer.
//!
//! Every variant is a policy rejection the client hears about. The
//! category/code pair it is reported with is defined once, in
//! [`RoomError::status`].

use nexus_protocol::{RoomCode, ServerPacket, StatusCategory, status_code};

/// Reasons a create, join or leave request was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// A room cannot be created without a secret.
    #[error("a room secret is required")]
    MissingSecret,

    /// The requested code is already taken.
    #[error("room already created:{0}")]
    AlreadyExists(String),

    /// The hub's room slot table is full.
    #[error("maximum number of simultaneous rooms reached")]
    CapacityReached,

    /// No room with this code exists, or the requester already has one.
    #[error("room not found:{0}")]
    NotFound(String),

    /// The room runs a different application or version.
    #[error("room not found (incompatible version):{0}")]
    VersionMismatch(String),

    /// The host has disabled joining.
    #[error("room is not accepting new players:{0}")]
    JoinDisabled(String),

    #[error("room not found (invalid secret):{0}")]
    InvalidSecret(String),

    /// The room is closing.
    #[error("room is closed:{0}")]
    Closed(String),

    /// Every peer slot is taken.
    #[error("room is full:{0}")]
    RoomFull(RoomCode),

    /// A leave arrived from a session that is not a member.
    #[error("no active room")]
    NotInRoom,

    /// The room's control mailbox is full or already closed.
    #[error("room is unavailable:{0}")]
    Unavailable(RoomCode),
}

impl RoomError {
    /// The `(category, code)` pair this rejection is reported with.
    pub fn category_code(&self) -> (StatusCategory, u8) {
        match self {
            Self::MissingSecret | Self::AlreadyExists(_) => {
                (StatusCategory::Notice, status_code::REJECTED)
            }
            Self::CapacityReached | Self::RoomFull(_) => {
                (StatusCategory::Notice, status_code::CAPACITY)
            }
            Self::NotFound(_)
            | Self::VersionMismatch(_)
            | Self::InvalidSecret(_)
            | Self::NotInRoom => (StatusCategory::Notice, status_code::NOT_FOUND),
            Self::JoinDisabled(_) => (StatusCategory::Admin, 0),
            Self::Closed(_) | Self::Unavailable(_) => {
                (StatusCategory::Notice, status_code::CLOSED)
            }
        }
    }

    /// The status packet sent to the rejected client.
    pub fn status(&self) -> ServerPacket {
        let (category, code) = self.category_code();
        ServerPacket::status(category, code, self.to_string())
    }
}
