//! # Nexus
//!
//! Real-time multiplayer relay server.
//!
//! Clients connect over WebSocket, create or join rooms identified by short
//! codes, and exchange opaque binary payloads that the server relays under
//! a host-authority policy: the peer in slot 0 may address anyone, every
//! other peer may only address the host.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nexus::prelude::*;
//!
//! # async fn start() -> Result<(), NexusError> {
//! let server = NexusServer::builder().bind("0.0.0.0:8080").build().await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::NexusError;
pub use server::{NexusServer, NexusServerBuilder};

/// Everything needed to configure and run a server.
pub mod prelude {
    pub use crate::{NexusError, NexusServer, NexusServerBuilder};
    pub use nexus_room::{Hub, HubConfig, HubSnapshot, RoomConfig};
    pub use nexus_session::SessionConfig;
}
