//! Wire protocol for the Nexus relay.
//!
//! This crate defines the bytes clients and the server exchange:
//!
//! - **Types** ([`PeerId`], [`RoomCode`], [`RoomRequest`], ...): values
//!   carried inside frames.
//! - **Packets** ([`ClientFrame`], [`HubRequest`], [`RoomFrame`],
//!   [`ServerPacket`]): the fixed binary layout, one frame per transport
//!   message, dispatched on the first byte.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how the JSON body of a
//!   create/join command is decoded.
//! - **Errors** ([`ProtocolError`]): why a frame was dropped.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about connections, sessions, or rooms.
//! It only turns bytes into typed frames and packets into bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (frames) → Session → Hub / Room actors
//! ```

mod codec;
mod error;
pub mod packet;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use packet::{ClientFrame, HubRequest, RoomFrame, ServerPacket};
pub use types::{
    PeerId, PlayerState, RoomCode, RoomRequest, StatusCategory, status_code,
};
