//! Error types for the session layer.

use nexus_protocol::ProtocolError;

/// Reasons an inbound frame could not be forwarded.
///
/// None of these close the connection; the adapter logs them and keeps
/// reading.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The frame could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Room traffic arrived while the session has no seat, or the room
    /// it sat in has already stopped.
    #[error("session is not in a room")]
    NotInRoom,

    /// The session was already unregistered.
    #[error("session is detached")]
    Detached,

    /// The target actor's mailbox is closed.
    #[error("mailbox closed")]
    MailboxClosed,
}
