//! Integration tests for the relay server, handler, and full connection flow.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use nexus::prelude::*;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(2);

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn test_config() -> HubConfig {
    HubConfig {
        lobby_timeout: Duration::from_secs(30),
        room: RoomConfig {
            disconnect_grace: Duration::from_millis(20),
            ..RoomConfig::default()
        },
        ..HubConfig::default()
    }
}

/// Starts a server on a random port and returns the address and its hub.
async fn start_server(config: HubConfig) -> (String, Hub) {
    let server = NexusServer::builder()
        .bind("127.0.0.1:0")
        .hub_config(config)
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let hub = server.hub().clone();

    tokio::spawn(async move {
        let _ = server.run_until(std::future::pending()).await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, hub)
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, frame: Vec<u8>) {
    ws.send(Message::Binary(frame.into()))
        .await
        .expect("send should succeed");
}

async fn recv(ws: &mut ClientWs) -> Vec<u8> {
    loop {
        let msg = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Binary(data) => return data.to_vec(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

/// Waits until the server closes the connection.
async fn expect_closed(ws: &mut ClientWs) {
    loop {
        match timeout(WAIT, ws.next()).await.expect("connection not closed") {
            None | Some(Ok(Message::Close(_))) | Some(Err(_)) => return,
            Some(Ok(_)) => continue,
        }
    }
}

fn hub_frame(op: u8, code: &str, name: &str) -> Vec<u8> {
    let body = serde_json::json!({
        "room_id": code,
        "room_pwd": "pw",
        "app_name": "demo",
        "player_name": name,
    });
    let mut frame = vec![0, op];
    frame.extend_from_slice(body.to_string().as_bytes());
    frame
}

/// Creates a room as "Alice" and returns the connection and room code.
async fn create_room(addr: &str) -> (ClientWs, String) {
    let mut host = connect(addr).await;
    send(&mut host, hub_frame(0, "", "Alice")).await;

    let joining = recv(&mut host).await;
    assert_eq!(&joining[..3], &[2, 0, 0]);
    let code = String::from_utf8(joining[3..].to_vec()).unwrap();
    assert_eq!(recv(&mut host).await, [1, 3, 0, 2, b'A', b'l', b'i', b'c', b'e']);
    let joined = recv(&mut host).await;
    assert_eq!(&joined[..3], &[2, 5, 0]);
    (host, code)
}

/// Joins `code` as `name`, returning once the joined status arrives.
async fn join_room(addr: &str, code: &str, name: &str) -> ClientWs {
    let mut guest = connect(addr).await;
    send(&mut guest, hub_frame(1, code, name)).await;
    loop {
        let frame = recv(&mut guest).await;
        if frame.starts_with(&[2, 5, 0]) {
            return guest;
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_server_create_join_and_relay() {
    let (addr, hub) = start_server(test_config()).await;
    let (mut host, code) = create_room(&addr).await;
    let mut guest = join_room(&addr, &code, "Bob").await;

    assert_eq!(recv(&mut host).await, [1, 3, 1, 1, b'B', b'o', b'b']);
    assert!(hub.room(&code).is_some());

    // Guest → host, with a spoofed origin.
    send(&mut guest, vec![1, 0, 42, 0, 255, 0xCA, 0xFE]).await;
    assert_eq!(recv(&mut host).await, [1, 0, 1, 0, 0xCA, 0xFE]);

    // Host → everyone.
    send(&mut host, vec![1, 0, 0, 255, 255, 0x01]).await;
    assert_eq!(recv(&mut guest).await, [1, 0, 0, 255, 0x01]);
}

#[tokio::test]
async fn test_server_echo_returns_frame() {
    let (addr, _hub) = start_server(test_config()).await;
    let mut client = connect(&addr).await;

    send(&mut client, vec![5, 9, 8, 7]).await;

    assert_eq!(recv(&mut client).await, [5, 9, 8, 7]);
}

#[tokio::test]
async fn test_server_malformed_frames_keep_connection_open() {
    let (addr, _hub) = start_server(test_config()).await;
    let mut client = connect(&addr).await;

    send(&mut client, vec![]).await;
    send(&mut client, vec![42, 1]).await;
    send(&mut client, vec![0, 0, b'{', b'x']).await;
    send(&mut client, vec![5, 1]).await;

    assert_eq!(recv(&mut client).await, [5, 1]);
}

#[tokio::test]
async fn test_server_host_disconnect_closes_guest() {
    let (addr, hub) = start_server(test_config()).await;
    let (host, code) = create_room(&addr).await;
    let mut guest = join_room(&addr, &code, "Bob").await;

    drop(host);

    let closing = recv(&mut guest).await;
    assert_eq!(&closing[..3], &[2, 2, 1]);
    expect_closed(&mut guest).await;

    for _ in 0..100 {
        if hub.room(&code).is_none() && hub.stats().clients() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("room and clients were not released");
}

#[tokio::test]
async fn test_server_guest_disconnect_notifies_host() {
    let (addr, hub) = start_server(test_config()).await;
    let (mut host, code) = create_room(&addr).await;
    let guest = join_room(&addr, &code, "Bob").await;
    assert_eq!(recv(&mut host).await, [1, 3, 1, 1, b'B', b'o', b'b']);

    drop(guest);

    assert_eq!(recv(&mut host).await, [1, 3, 1, 0, b'B', b'o', b'b']);
    assert!(hub.room(&code).is_some());
}

#[tokio::test]
async fn test_server_idle_connection_closed_by_watchdog() {
    let (addr, hub) = start_server(HubConfig {
        lobby_timeout: Duration::from_millis(100),
        sweep_interval: Duration::from_millis(50),
        ..test_config()
    })
    .await;
    let mut idle = connect(&addr).await;

    expect_closed(&mut idle).await;

    for _ in 0..100 {
        if hub.stats().clients() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("idle client was not unregistered");
}

#[tokio::test]
async fn test_server_watchdog_drops_client_that_never_reads() {
    let (addr, hub) = start_server(HubConfig {
        lobby_timeout: Duration::from_millis(100),
        sweep_interval: Duration::from_millis(50),
        ..test_config()
    })
    .await;
    // Never polled, so the close handshake is never answered.
    let _silent = connect(&addr).await;

    for _ in 0..150 {
        if hub.stats().clients() == 0 && hub.snapshot().sessions.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("silent client is still registered");
}

#[tokio::test]
async fn test_server_shutdown_closes_rooms() {
    let server = NexusServer::builder()
        .bind("127.0.0.1:0")
        .hub_config(test_config())
        .build()
        .await
        .expect("server should build");
    let addr = server.local_addr().unwrap().to_string();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));

    let (mut host, _code) = create_room(&addr).await;
    stop_tx.send(()).unwrap();

    let closing = recv(&mut host).await;
    assert_eq!(&closing[..3], &[2, 2, 1]);
    expect_closed(&mut host).await;
    assert!(running.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_server_snapshot_counts_connections() {
    let (addr, hub) = start_server(test_config()).await;
    let (_host, code) = create_room(&addr).await;
    let _guest = join_room(&addr, &code, "Bob").await;

    let snapshot = hub.snapshot();
    assert_eq!(snapshot.clients, 2);
    assert_eq!(snapshot.client_connections, 2);
    assert_eq!(snapshot.room_creations, 1);
    assert_eq!(snapshot.rooms.len(), 1);
    assert_eq!(snapshot.rooms[0].code.as_str(), code);
}
