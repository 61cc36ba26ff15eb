//! Per-connection adapter between the transport and the hub.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Connect event → the hub creates and registers a `Session`
//!   2. A writer task drains the session's outbound queue into the socket
//!   3. Loop: receive frames → `Session::receive`
//!   4. Read side ends, or the writer stops after a server-side close
//!      → disconnect event

use std::sync::Arc;

use nexus_room::Hub;
use nexus_session::{Outbound, Session};
use nexus_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::NexusError;

/// Drop guard that reports the disconnect when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async part.
struct DisconnectGuard {
    hub: Hub,
    session: Arc<Session>,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let hub = self.hub.clone();
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            hub.disconnect(&session).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    hub: Hub,
) -> Result<(), NexusError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    let (session, outbound) = hub.connect(conn_id);
    tracing::debug!(%conn_id, remote = ?conn.remote_addr(), "handling new connection");

    let _guard = DisconnectGuard {
        hub,
        session: Arc::clone(&session),
    };
    let mut writer = tokio::spawn(write_loop(Arc::clone(&conn), outbound));

    // The server never waits on the peer to finish a close it started:
    // once the writer stops, the reader goes too and the socket is dropped.
    loop {
        tokio::select! {
            received = conn.recv() => match received {
                Ok(Some(frame)) => {
                    if let Err(e) = session.receive(frame).await {
                        tracing::debug!(%conn_id, error = %e, "frame dropped");
                    }
                }
                Ok(None) => {
                    tracing::debug!(%conn_id, "connection closed");
                    writer.abort();
                    return Ok(());
                }
                Err(e) => {
                    writer.abort();
                    return Err(e.into());
                }
            },
            _ = &mut writer => {
                tracing::debug!(%conn_id, "connection closed by server");
                return Ok(());
            }
        }
    }
}

/// Writes queued frames until the session asks for a close or lets go of
/// its queue.
async fn write_loop(
    conn: Arc<WebSocketConnection>,
    mut outbound: mpsc::Receiver<Outbound>,
) {
    let conn_id = conn.id();
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(frame) => {
                if let Err(e) = conn.send(&frame).await {
                    tracing::debug!(%conn_id, error = %e, "send failed");
                    break;
                }
            }
            Outbound::Close => {
                if let Err(e) = conn.close().await {
                    tracing::debug!(%conn_id, error = %e, "close failed");
                }
                break;
            }
        }
    }
}
