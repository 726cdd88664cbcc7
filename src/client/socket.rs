//! Push Channel Client
//!
//! Socket.IO (Engine.IO v4) over a WebSocket, driven by a background tokio
//! task. The connection is an explicit object owned by the application:
//! outbound events go through [`PushChannel::emit`], inbound events and
//! connection status changes arrive on an mpsc receiver.
//!
//! Reconnection is bounded: after `reconnection_attempts` consecutive
//! failures the task reports `Disconnected` and stops. The delay between
//! attempts doubles from `reconnection_delay` up to `reconnection_delay_max`.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::client::config::Config;
use crate::shared::error::{Result, SyncError};
use crate::shared::event::{InboundEvent, OutboundEvent};

/// Where outbound events go
pub trait PushChannel: Send + Sync {
    /// Queue an event for the server; never blocks
    fn emit(&self, event: OutboundEvent) -> Result<()>;
}

/// Connection status reported by the push channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Retrying,
    Error(String),
    Disconnected,
}

/// Everything the background task reports
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelUpdate {
    Status(ConnectionStatus),
    Event(InboundEvent),
}

/// One Engine.IO text frame, with Socket.IO packets inside `4`
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `0{...}` handshake from the server
    Open(Value),
    /// `1`
    Close,
    /// `2`
    Ping,
    /// `3`
    Pong,
    /// `40` / `40{...}`: namespace connect, with auth or the server's sid
    Connect(Option<Value>),
    /// `41`
    Disconnect,
    /// `42["name",payload]`
    Event { name: String, payload: Value },
    /// `44{...}`
    ConnectError(Value),
    /// `6`
    Noop,
}

impl Frame {
    pub fn encode(&self) -> String {
        match self {
            Self::Open(data) => format!("0{}", data),
            Self::Close => "1".to_string(),
            Self::Ping => "2".to_string(),
            Self::Pong => "3".to_string(),
            Self::Connect(None) => "40".to_string(),
            Self::Connect(Some(data)) => format!("40{}", data),
            Self::Disconnect => "41".to_string(),
            Self::Event { name, payload } => format!("42{}", json!([name, payload])),
            Self::ConnectError(data) => format!("44{}", data),
            Self::Noop => "6".to_string(),
        }
    }

    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let frame = match chars.next() {
            Some('0') => Self::Open(parse_json(&text[1..])?.unwrap_or(Value::Null)),
            Some('1') => Self::Close,
            Some('2') => Self::Ping,
            Some('3') => Self::Pong,
            Some('6') => Self::Noop,
            Some('4') => decode_packet(&text[1..])?,
            _ => return Err(SyncError::protocol(format!("Unknown frame '{}'", truncate(text)))),
        };
        Ok(frame)
    }
}

fn decode_packet(packet: &str) -> Result<Frame> {
    let (kind, rest) = match packet.char_indices().nth(1) {
        Some((split, _)) => packet.split_at(split),
        None => (packet, ""),
    };
    // Namespace prefix ("/ns,") and ack ids are not used by this backend
    let body = rest
        .find(['{', '['])
        .map(|start| &rest[start..])
        .unwrap_or("");
    match kind {
        "0" => Ok(Frame::Connect(parse_json(body)?)),
        "1" => Ok(Frame::Disconnect),
        "2" => {
            let items = match parse_json(body)? {
                Some(Value::Array(items)) => items,
                _ => return Err(SyncError::protocol("Event packet without array body")),
            };
            let mut items = items.into_iter();
            let name = match items.next() {
                Some(Value::String(name)) => name,
                _ => return Err(SyncError::protocol("Event packet without a name")),
            };
            Ok(Frame::Event {
                name,
                payload: items.next().unwrap_or(Value::Null),
            })
        }
        "4" => Ok(Frame::ConnectError(parse_json(body)?.unwrap_or(Value::Null))),
        other => Err(SyncError::protocol(format!("Unsupported packet type '{}'", other))),
    }
}

fn parse_json(body: &str) -> Result<Option<Value>> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(body)?))
}

fn truncate(text: &str) -> String {
    text.chars().take(40).collect()
}

#[derive(Debug, Clone)]
struct Settings {
    url: String,
    token: String,
    attempts: u32,
    delay: Duration,
    delay_max: Duration,
    connect_timeout: Duration,
}

enum SessionEnd {
    /// The owner dropped the connection
    Closed,
    /// An established session was lost
    Dropped,
}

/// Handle to the background push-channel task
#[derive(Debug)]
pub struct PushConnection {
    outbound: mpsc::UnboundedSender<OutboundEvent>,
    task: JoinHandle<()>,
}

impl PushConnection {
    /// Start connecting in the background. Must be called inside a tokio
    /// runtime.
    pub fn spawn(config: &Config) -> Result<(Self, mpsc::UnboundedReceiver<ChannelUpdate>)> {
        let token = config
            .get_token()
            .cloned()
            .ok_or_else(|| SyncError::validation("token", "Not authenticated"))?;
        let app = config.app();
        let settings = Settings {
            url: config.socket_url(),
            token,
            attempts: app.reconnection_attempts,
            delay: app.reconnection_delay,
            delay_max: app.reconnection_delay_max,
            connect_timeout: app.connect_timeout,
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(settings, outbound_rx, update_tx));
        Ok((
            Self {
                outbound: outbound_tx,
                task,
            },
            update_rx,
        ))
    }

    /// Whether the background task has given up or been stopped
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

impl PushChannel for PushConnection {
    fn emit(&self, event: OutboundEvent) -> Result<()> {
        tracing::debug!("[SOCKET] Queueing '{}'", event.name());
        self.outbound.send(event).map_err(|_| SyncError::NotConnected)
    }
}

async fn run(
    settings: Settings,
    mut outbound: mpsc::UnboundedReceiver<OutboundEvent>,
    updates: mpsc::UnboundedSender<ChannelUpdate>,
) {
    let status = |s: ConnectionStatus| {
        let _ = updates.send(ChannelUpdate::Status(s));
    };
    let mut failures = 0u32;
    let mut delay = settings.delay;

    loop {
        tracing::info!("[SOCKET] Connecting to {}", settings.url);
        status(ConnectionStatus::Connecting);

        match session(&settings, &mut outbound, &updates).await {
            Ok(SessionEnd::Closed) => {
                tracing::info!("[SOCKET] Connection closed by owner");
                status(ConnectionStatus::Disconnected);
                return;
            }
            Ok(SessionEnd::Dropped) => {
                tracing::warn!("[SOCKET] Connection lost");
                status(ConnectionStatus::Disconnected);
                failures = 0;
                delay = settings.delay;
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(
                    "[SOCKET] Connect attempt {}/{} failed: {}",
                    failures,
                    settings.attempts,
                    e
                );
                status(ConnectionStatus::Error(e.to_string()));
            }
        }

        if failures >= settings.attempts || updates.is_closed() {
            tracing::error!("[SOCKET] Giving up after {} failed attempts", failures);
            status(ConnectionStatus::Disconnected);
            return;
        }
        status(ConnectionStatus::Retrying);
        tokio::time::sleep(delay).await;
        delay = std::cmp::min(delay * 2, settings.delay_max);
    }
}

async fn session(
    settings: &Settings,
    outbound: &mut mpsc::UnboundedReceiver<OutboundEvent>,
    updates: &mpsc::UnboundedSender<ChannelUpdate>,
) -> Result<SessionEnd> {
    let (ws, _) = tokio::time::timeout(
        settings.connect_timeout,
        tokio_tungstenite::connect_async(settings.url.as_str()),
    )
    .await
    .map_err(|_| SyncError::network("Connect timed out"))??;
    let (mut write, mut read) = ws.split();
    let mut connected = false;

    let lost = |connected: bool, reason: &str| -> Result<SessionEnd> {
        if connected {
            tracing::debug!("[SOCKET] {}", reason);
            Ok(SessionEnd::Dropped)
        } else {
            Err(SyncError::network(reason.to_string()))
        }
    };

    loop {
        tokio::select! {
            incoming = read.next() => {
                let text = match incoming {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => return lost(connected, "Socket closed"),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return lost(connected, &e.to_string()),
                };
                let frame = match Frame::decode(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("[SOCKET] Skipping frame: {}", e);
                        continue;
                    }
                };
                let reply = match frame {
                    Frame::Open(_) => Some(Frame::Connect(Some(json!({ "token": settings.token })))),
                    Frame::Ping => Some(Frame::Pong),
                    Frame::Connect(_) => {
                        tracing::info!("[SOCKET] Connected");
                        connected = true;
                        let _ = updates.send(ChannelUpdate::Status(ConnectionStatus::Connected));
                        None
                    }
                    Frame::ConnectError(data) => {
                        return Err(SyncError::network(format!("Connection refused: {}", data)));
                    }
                    Frame::Disconnect | Frame::Close => return lost(connected, "Server disconnected"),
                    Frame::Event { name, payload } => {
                        match InboundEvent::parse(&name, payload) {
                            Ok(event) => {
                                tracing::debug!("[SOCKET] Received '{}'", name);
                                let _ = updates.send(ChannelUpdate::Event(event));
                            }
                            Err(e) => tracing::warn!("[SOCKET] Dropping '{}': {}", name, e),
                        }
                        None
                    }
                    Frame::Pong | Frame::Noop => None,
                };
                if let Some(reply) = reply {
                    if let Err(e) = write.send(WsMessage::Text(reply.encode())).await {
                        return lost(connected, &e.to_string());
                    }
                }
            }
            next = outbound.recv(), if connected => {
                let Some(event) = next else {
                    let _ = write.send(WsMessage::Text(Frame::Disconnect.encode())).await;
                    let _ = write.close().await;
                    return Ok(SessionEnd::Closed);
                };
                let frame = Frame::Event {
                    name: event.name().to_string(),
                    payload: event.payload(),
                };
                if let Err(e) = write.send(WsMessage::Text(frame.encode())).await {
                    tracing::warn!("[SOCKET] Failed to emit '{}': {}", event.name(), e);
                    return lost(connected, &e.to_string());
                }
            }
        }
    }
}
