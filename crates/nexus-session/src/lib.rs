//! Per-connection session state for the Nexus relay.
//!
//! A [`Session`] exists for every live connection. It turns raw inbound
//! frames into mailbox messages for the hub or room actors, and hands
//! outbound frames to the transport.
//!
//! # How it fits in the stack
//!
//! ```text
//! Hub / Room actors (above)  ← consume UserPacket, write Seat, send packets
//!     ↕
//! Session (this crate)       ← identity, seat, outbound queue
//!     ↕
//! Protocol (below)           ← ClientFrame dispatch, ServerPacket encoding
//! ```

mod error;
mod session;

pub use error::SessionError;
pub use session::{
    DEFAULT_NAME, Outbound, Seat, Session, SessionConfig, SessionStats,
    UserPacket,
};
