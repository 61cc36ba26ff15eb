//! Unified error type for the Nexus relay.

use nexus_protocol::ProtocolError;
use nexus_room::RoomError;
use nexus_session::SessionError;
use nexus_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert layer errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum NexusError {
    /// Binding, accepting, reading or writing a connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A frame could not be forwarded to an actor.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room operation was rejected.
    #[error(transparent)]
    Room(#[from] RoomError),
}
