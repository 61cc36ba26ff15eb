use std::time::Duration;

use clap::Parser;
use nexus::prelude::*;
use tracing_subscriber::EnvFilter;

/// nexus-relay - host-authoritative multiplayer relay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Maximum number of simultaneous rooms
    #[arg(long, default_value_t = 64)]
    max_rooms: usize,

    /// Peer slots per room, host included
    #[arg(long, default_value_t = 4)]
    max_peers: usize,

    /// How long a connection may stay without a room
    #[arg(long, default_value_t = 1000)]
    lobby_timeout_ms: u64,

    /// Artificial latency added to every frame, for testing clients
    #[arg(long)]
    send_delay_ms: Option<u64>,
}

impl Args {
    fn hub_config(&self) -> HubConfig {
        let defaults = HubConfig::default();
        HubConfig {
            max_rooms: self.max_rooms,
            lobby_timeout: Duration::from_millis(self.lobby_timeout_ms),
            room: RoomConfig {
                max_peers: self.max_peers,
                ..defaults.room.clone()
            },
            session: SessionConfig {
                send_delay: self.send_delay_ms.map(Duration::from_millis),
                ..defaults.session.clone()
            },
            ..defaults
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), NexusError> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server = NexusServer::builder()
        .bind(&args.bind)
        .hub_config(args.hub_config())
        .build()
        .await?;
    server.run().await
}
