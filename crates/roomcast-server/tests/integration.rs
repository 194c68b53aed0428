//! End-to-end integration tests using real WebSocket clients.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use roomcast_engine::{Hub, HubConfig};
use roomcast_server::auth::Authenticator;
use roomcast_server::config::RelayConfig;
use roomcast_server::server::RelayServer;

const TIMEOUT: Duration = Duration::from_secs(5);
const SILENCE: Duration = Duration::from_millis(300);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Boot a test server on an ephemeral port. Returns the ws URL base.
async fn boot_server(config: RelayConfig) -> (String, Arc<RelayServer>) {
    let mut config = config;
    config.server.host = "127.0.0.1".into();
    config.server.port = 0;

    let hub = Arc::new(Hub::new(HubConfig {
        room_capacity: config.rooms.max_members,
    }));
    // Local recorder so parallel tests never fight over the global one.
    let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
    let server = Arc::new(RelayServer::new(config, hub, metrics_handle));

    let (addr, _handle) = server.listen().await.unwrap();
    (format!("ws://{addr}/ws"), server)
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.expect("websocket connect failed");
    ws
}

/// Read the next JSON text frame, skipping control frames.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Assert no text frame arrives within the silence window.
async fn expect_silence(ws: &mut WsStream) {
    let got = timeout(SILENCE, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text.to_string(),
                Some(Ok(_)) => continue,
                _ => std::future::pending::<()>().await,
            }
        }
    })
    .await;
    assert!(got.is_err(), "expected silence, got frame: {got:?}");
}

async fn subscribe(ws: &mut WsStream, channel: &str, event: Option<&str>) -> Value {
    let mut req = json!({"type": "subscribe", "channel": channel});
    if let Some(e) = event {
        req["event"] = json!(e);
    }
    ws.send(Message::text(req.to_string())).await.unwrap();
    read_json(ws).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_subscribe_is_confirmed() {
    let (url, server) = boot_server(RelayConfig::default()).await;
    let mut ws = connect(&url).await;

    let reply = subscribe(&mut ws, "demo", None).await;
    assert_eq!(reply["type"], "subscribed");
    assert_eq!(reply["channel"], "demo");
    assert_eq!(reply["event"], "signal:all");
    assert_eq!(reply["data"]["status"], "subscribed");
    assert_eq!(reply["data"]["room"], "demo");

    let stats = server.hub().stats();
    assert_eq!(stats.connections, 1);
    assert_eq!(stats.rooms, 1);

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_two_clients_exchange_messages() {
    let (url, server) = boot_server(RelayConfig::default()).await;
    let mut alice = connect(&format!("{url}?subject=alice")).await;
    let mut bob = connect(&format!("{url}?subject=bob")).await;

    subscribe(&mut alice, "demo", None).await;
    subscribe(&mut bob, "demo", None).await;

    alice
        .send(Message::text(
            json!({"type": "publish", "channel": "demo", "data": {"kind": "discover"}}).to_string(),
        ))
        .await
        .unwrap();

    let msg = read_json(&mut bob).await;
    assert_eq!(msg["type"], "message");
    assert_eq!(msg["channel"], "demo");
    assert_eq!(msg["event"], "signal:all");
    assert_eq!(msg["data"]["kind"], "discover");
    assert_eq!(msg["data"]["from"], "alice");
    assert!(msg["timestamp"].is_i64());

    // The sender never hears its own publish.
    expect_silence(&mut alice).await;

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_specific_event_routing() {
    let (url, server) = boot_server(RelayConfig::default()).await;
    let mut alice = connect(&format!("{url}?subject=alice")).await;
    let mut bob = connect(&format!("{url}?subject=bob")).await;

    subscribe(&mut alice, "demo", None).await;
    subscribe(&mut bob, "demo", Some("signal:bob")).await;

    // Directed event reaches bob.
    alice
        .send(Message::text(
            json!({"type": "publish", "channel": "demo", "event": "signal:bob", "data": {"n": 1}})
                .to_string(),
        ))
        .await
        .unwrap();
    let msg = read_json(&mut bob).await;
    assert_eq!(msg["event"], "signal:bob");
    assert_eq!(msg["data"]["n"], 1);

    // Broadcast publish skips the specific-only subscriber.
    alice
        .send(Message::text(
            json!({"type": "publish", "channel": "demo", "data": {"n": 2}}).to_string(),
        ))
        .await
        .unwrap();
    expect_silence(&mut bob).await;

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_unknown_type_gets_error_frame() {
    let (url, server) = boot_server(RelayConfig::default()).await;
    let mut ws = connect(&url).await;

    ws.send(Message::text(json!({"type": "dance"}).to_string()))
        .await
        .unwrap();
    let reply = read_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["error"]["code"], 400);
    assert!(reply["error"]["message"]
        .as_str()
        .unwrap()
        .contains("dance"));

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_invalid_room_name_is_rejected() {
    let (url, server) = boot_server(RelayConfig::default()).await;
    let mut ws = connect(&url).await;

    let reply = subscribe(&mut ws, "room!", None).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["error"]["code"], 400);
    assert_eq!(server.hub().stats().rooms, 0);

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_publish_requires_membership() {
    let (url, server) = boot_server(RelayConfig::default()).await;
    let mut ws = connect(&url).await;

    ws.send(Message::text(
        json!({"type": "publish", "channel": "demo", "data": {}}).to_string(),
    ))
    .await
    .unwrap();
    let reply = read_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert!(reply["error"]["message"]
        .as_str()
        .unwrap()
        .contains("not a member"));

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_unsubscribe_destroys_empty_room() {
    let (url, server) = boot_server(RelayConfig::default()).await;
    let mut ws = connect(&url).await;

    subscribe(&mut ws, "demo", None).await;
    assert_eq!(server.hub().stats().rooms, 1);

    ws.send(Message::text(
        json!({"type": "unsubscribe", "channel": "demo"}).to_string(),
    ))
    .await
    .unwrap();
    let reply = read_json(&mut ws).await;
    assert_eq!(reply["type"], "unsubscribed");
    assert_eq!(reply["data"]["status"], "unsubscribed");
    assert_eq!(server.hub().stats().rooms, 0);

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_default_subject_is_generated() {
    let (url, server) = boot_server(RelayConfig::default()).await;
    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;

    subscribe(&mut alice, "demo", None).await;
    subscribe(&mut bob, "demo", None).await;

    alice
        .send(Message::text(
            json!({"type": "publish", "channel": "demo", "data": {}}).to_string(),
        ))
        .await
        .unwrap();
    let msg = read_json(&mut bob).await;
    // No ?subject given, so the relay stamps the connection id.
    let from = msg["data"]["from"].as_str().unwrap();
    assert!(!from.is_empty());

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_disconnect_cleans_up_rooms() {
    let (url, server) = boot_server(RelayConfig::default()).await;
    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;

    subscribe(&mut alice, "demo", None).await;
    subscribe(&mut bob, "demo", None).await;

    alice.close(None).await.unwrap();
    // Give the server a moment to run the teardown.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stats = server.hub().stats();
    assert_eq!(stats.connections, 1);
    assert_eq!(stats.rooms, 1);

    bob.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    let stats = server.hub().stats();
    assert_eq!(stats.connections, 0);
    assert_eq!(stats.rooms, 0);
}

#[tokio::test]
async fn e2e_auth_rejects_missing_and_bad_tokens() {
    let mut config = RelayConfig::default();
    config.auth.secret = "relay_secret_123".into();
    let (url, server) = boot_server(config).await;

    let err = connect_async(&url).await.unwrap_err();
    let status = match err {
        tokio_tungstenite::tungstenite::Error::Http(resp) => resp.status(),
        other => panic!("expected HTTP rejection, got {other:?}"),
    };
    assert_eq!(status.as_u16(), 401);

    let err = connect_async(format!("{url}?token=deadbeef")).await.unwrap_err();
    assert!(matches!(
        err,
        tokio_tungstenite::tungstenite::Error::Http(_)
    ));

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_auth_accepts_minted_token() {
    let mut config = RelayConfig::default();
    config.auth.secret = "relay_secret_123".into();
    let (url, server) = boot_server(config).await;

    let token = Authenticator::new("relay_secret_123").generate_token();
    let mut ws = connect(&format!("{url}?token={token}&subject=alice")).await;
    let reply = subscribe(&mut ws, "demo", None).await;
    assert_eq!(reply["type"], "subscribed");

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_han_room_names_accepted() {
    let (url, server) = boot_server(RelayConfig::default()).await;
    let mut ws = connect(&url).await;

    let reply = subscribe(&mut ws, "客厅", None).await;
    assert_eq!(reply["type"], "subscribed");
    assert_eq!(reply["channel"], "客厅");

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_room_capacity_enforced() {
    let mut config = RelayConfig::default();
    config.rooms.max_members = 1;
    let (url, server) = boot_server(config).await;

    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;

    let reply = subscribe(&mut alice, "demo", None).await;
    assert_eq!(reply["type"], "subscribed");
    let reply = subscribe(&mut bob, "demo", None).await;
    assert_eq!(reply["type"], "error");
    assert!(reply["error"]["message"].as_str().unwrap().contains("full"));

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_shutdown_closes_sessions() {
    let (url, server) = boot_server(RelayConfig::default()).await;
    let mut ws = connect(&url).await;
    subscribe(&mut ws, "demo", None).await;

    server.shutdown().shutdown();

    // The session loop should end the stream promptly.
    let closed = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "session did not close on shutdown");
}
