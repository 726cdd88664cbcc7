//! Push channel tests against a local WebSocket server speaking just
//! enough Engine.IO to complete a handshake

use assert_matches::assert_matches;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::assert_err;
use webchat_sync::client::{ChannelUpdate, Config, ConnectionStatus, PushChannel, PushConnection};
use webchat_sync::shared::config::AppConfig;
use webchat_sync::shared::error::SyncError;
use webchat_sync::shared::event::{InboundEvent, OutboundEvent};

const WAIT: Duration = Duration::from_secs(5);

fn config(addr: std::net::SocketAddr, attempts: u32) -> Config {
    let app = AppConfig::builder()
        .server_url(format!("http://{}", addr))
        .reconnection_attempts(attempts)
        .reconnection_delay(Duration::from_millis(10))
        .reconnection_delay_max(Duration::from_millis(20))
        .connect_timeout(Duration::from_secs(2));
    let mut config = Config::with_builder(app).unwrap();
    config.set_token(Some("secret".to_string()));
    config
}

async fn next_update(updates: &mut UnboundedReceiver<ChannelUpdate>) -> ChannelUpdate {
    tokio::time::timeout(WAIT, updates.recv())
        .await
        .expect("timed out waiting for update")
        .expect("update channel closed")
}

/// Every status update until the background task gives up
async fn drain_statuses(updates: &mut UnboundedReceiver<ChannelUpdate>) -> Vec<ConnectionStatus> {
    let mut statuses = Vec::new();
    while let Ok(Some(update)) = tokio::time::timeout(WAIT, updates.recv()).await {
        if let ChannelUpdate::Status(status) = update {
            statuses.push(status);
        }
    }
    statuses
}

/// Socket.IO event packet as (name, payload)
fn parse_event(text: &str) -> Option<(String, Value)> {
    let body = text.strip_prefix("42")?;
    match serde_json::from_str::<Value>(body).ok()? {
        Value::Array(mut items) if items.len() == 2 => {
            let payload = items.pop()?;
            let name = items.pop()?.as_str()?.to_string();
            Some((name, payload))
        }
        _ => None,
    }
}

#[tokio::test]
async fn test_handshake_events_and_emits() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(WsMessage::Text(r#"0{"sid":"e1","pingInterval":25000,"pingTimeout":20000}"#.into()))
            .await
            .unwrap();

        let auth = ws.next().await.unwrap().unwrap().into_text().unwrap();
        assert_eq!(auth, r#"40{"token":"secret"}"#);
        ws.send(WsMessage::Text(r#"40{"sid":"s1"}"#.into())).await.unwrap();
        ws.send(WsMessage::Text(
            r#"42["new message",{"id":5,"conversation_id":"c1","sender":9,"content":"hi"}]"#.into(),
        ))
        .await
        .unwrap();
        ws.send(WsMessage::Text("2".into())).await.unwrap();

        let mut seen = Vec::new();
        while let Some(Ok(message)) = ws.next().await {
            let WsMessage::Text(text) = message else { continue };
            if text == "3" {
                seen.push(("pong".to_string(), Value::Null));
            } else if let Some(event) = parse_event(&text) {
                seen.push(event);
            }
            if seen.len() == 2 {
                break;
            }
        }
        seen
    });

    let (connection, mut updates) = PushConnection::spawn(&config(addr, 1)).unwrap();
    assert_eq!(next_update(&mut updates).await, ChannelUpdate::Status(ConnectionStatus::Connecting));
    assert_eq!(next_update(&mut updates).await, ChannelUpdate::Status(ConnectionStatus::Connected));
    assert_matches!(
        next_update(&mut updates).await,
        ChannelUpdate::Event(InboundEvent::NewMessage(raw)) if raw.first_string(&["id"]).as_deref() == Some("5")
    );

    connection
        .emit(OutboundEvent::JoinConversation {
            conversation_id: "c1".into(),
        })
        .unwrap();

    let mut seen = tokio::time::timeout(WAIT, server).await.unwrap().unwrap();
    seen.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        seen,
        vec![
            ("join conversation".to_string(), json!({"conversation_id": "c1"})),
            ("pong".to_string(), Value::Null),
        ]
    );
    connection.shutdown();
}

#[tokio::test]
async fn test_reconnect_is_bounded() {
    // Bind then drop to get a port nothing listens on
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let (_connection, mut updates) = PushConnection::spawn(&config(addr, 2)).unwrap();
    let statuses = drain_statuses(&mut updates).await;

    assert_eq!(statuses.len(), 6, "{:?}", statuses);
    assert_eq!(statuses[0], ConnectionStatus::Connecting);
    assert_matches!(statuses[1], ConnectionStatus::Error(_));
    assert_eq!(statuses[2], ConnectionStatus::Retrying);
    assert_eq!(statuses[3], ConnectionStatus::Connecting);
    assert_matches!(statuses[4], ConnectionStatus::Error(_));
    assert_eq!(statuses[5], ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_connect_error_counts_as_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(WsMessage::Text(r#"0{"sid":"e1"}"#.into())).await.unwrap();
        let _auth = ws.next().await;
        ws.send(WsMessage::Text(r#"44{"message":"invalid token"}"#.into()))
            .await
            .unwrap();
        // Hold the socket open until the client hangs up
        while ws.next().await.is_some() {}
    });

    let (_connection, mut updates) = PushConnection::spawn(&config(addr, 1)).unwrap();
    let statuses = drain_statuses(&mut updates).await;
    assert_eq!(statuses.first(), Some(&ConnectionStatus::Connecting));
    assert_matches!(
        &statuses[1],
        ConnectionStatus::Error(reason) if reason.contains("invalid token")
    );
    assert_eq!(statuses.last(), Some(&ConnectionStatus::Disconnected));
    assert!(!statuses.contains(&ConnectionStatus::Connected));
}

#[tokio::test]
async fn test_spawn_requires_token() {
    let mut config = Config::default();
    config.clear_token();
    assert_err!(PushConnection::spawn(&config), SyncError::Validation { .. });
}
