//! `NexusServer` builder and server loop.
//!
//! This is the entry point for running a relay. It ties together all the
//! layers: transport → session → hub / room actors.

use std::future::Future;
use std::net::SocketAddr;

use nexus_room::{Hub, HubConfig};
use nexus_transport::{Transport, WebSocketTransport};

use crate::NexusError;
use crate::handler::handle_connection;

/// Builder for configuring and starting a relay server.
///
/// # Example
///
/// ```rust,no_run
/// use nexus::prelude::*;
///
/// # async fn start() -> Result<(), NexusError> {
/// let server = NexusServer::builder()
///     .bind("0.0.0.0:8080")
///     .hub_config(HubConfig::default())
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct NexusServerBuilder {
    bind_addr: String,
    hub_config: HubConfig,
}

impl NexusServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            hub_config: HubConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the hub, room and session configuration.
    pub fn hub_config(mut self, config: HubConfig) -> Self {
        self.hub_config = config;
        self
    }

    /// Binds the listener and starts the hub actor.
    pub async fn build(self) -> Result<NexusServer, NexusError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let hub = Hub::spawn(self.hub_config);
        Ok(NexusServer { transport, hub })
    }
}

impl Default for NexusServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A relay server bound to its port.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct NexusServer {
    transport: WebSocketTransport,
    hub: Hub,
}

impl NexusServer {
    /// Creates a new builder.
    pub fn builder() -> NexusServerBuilder {
        NexusServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, NexusError> {
        Ok(self.transport.local_addr()?)
    }

    /// The hub this server feeds connections into.
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Runs the accept loop until Ctrl-C.
    pub async fn run(self) -> Result<(), NexusError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Runs the accept loop until `shutdown` resolves, then closes every
    /// room and stops the hub.
    ///
    /// Each accepted connection is handled in its own task.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), NexusError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Nexus relay running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let hub = self.hub.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, hub).await {
                                tracing::debug!(
                                    error = %e,
                                    "connection ended with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("shutdown requested");
        self.hub.shutdown().await;
        Ok(())
    }
}
