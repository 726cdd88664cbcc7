//! Raw payload builders
//!
//! Shapes mirror what the chat backend sends over REST and the push channel.

use serde_json::json;
use webchat_sync::client::ChannelUpdate;
use webchat_sync::shared::event::InboundEvent;
use webchat_sync::shared::messaging::{RawConversation, RawMessage, RawPage};

pub const LOCAL_USER: i64 = 7;
pub const OTHER_USER: i64 = 9;

/// Text message as stored by the backend; `id` doubles as the second of
/// its timestamp so ordering is deterministic
pub fn raw_text(id: i64, conversation: &str, sender: i64, content: &str) -> RawMessage {
    RawMessage::new(json!({
        "id": id,
        "conversation_id": conversation,
        "sender": sender,
        "content": content,
        "type": "text",
        "created_at": format!("2024-05-01T10:00:{:02}Z", id % 60),
    }))
}

/// History page; `ids` are given newest first, as the backend orders them
pub fn page(conversation: &str, ids: &[i64], next_cursor: Option<&str>) -> RawPage {
    RawPage {
        messages: ids
            .iter()
            .map(|id| raw_text(*id, conversation, OTHER_USER, &format!("message {}", id)))
            .collect(),
        next_cursor: next_cursor.map(str::to_string),
    }
}

pub fn new_message(raw: RawMessage) -> ChannelUpdate {
    ChannelUpdate::Event(InboundEvent::NewMessage(raw))
}

/// Parse an event the way the push channel does
pub fn event(name: &str, payload: serde_json::Value) -> ChannelUpdate {
    ChannelUpdate::Event(InboundEvent::parse(name, payload).unwrap())
}

pub fn raw_conversation(id: &str, last_id: i64, last_at: &str) -> RawConversation {
    RawConversation::new(json!({
        "conversation_id": id,
        "participants": [LOCAL_USER.to_string(), OTHER_USER.to_string()],
        "lastMessage": {"id": last_id, "content": "last", "created_at": last_at},
    }))
}
