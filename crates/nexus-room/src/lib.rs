//! Room and hub actors for the Nexus relay.
//!
//! The hub and every room run as isolated Tokio tasks (actor model), each
//! draining its own bounded mailboxes one message at a time. That is the
//! only synchronization for room rosters and directory mutations; the
//! concurrent maps are there so transport tasks can register sessions and
//! look rooms up without going through an actor.
//!
//! # Key types
//!
//! - [`Hub`]: directory of rooms and connections, the pre-room watchdog
//! - [`RoomHandle`]: a published room's code, flags and counters
//! - [`RoomState`]: lifecycle state machine
//! - [`HubConfig`] / [`RoomConfig`]: capacities, mailbox sizes, timers
//! - [`RoomError`]: policy rejections and their status packets
//! - [`HubSnapshot`]: serializable read-only view for introspection

mod config;
mod error;
mod hub;
mod room;
mod snapshot;

pub use config::{HubConfig, RoomConfig, RoomState};
pub use error::RoomError;
pub use hub::{Hub, HubStats};
pub use room::{RoomHandle, RoomStats};
pub use snapshot::{HubSnapshot, RoomSummary, SessionSummary};
