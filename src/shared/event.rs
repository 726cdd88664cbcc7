/**
 * Push Channel Events
 *
 * Events exchanged with the backend over the push channel. Inbound events
 * are parsed from an event name plus JSON payload; outbound events render
 * back into the same shape. Message bodies stay raw until the normalizer
 * sees them.
 */
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::shared::error::{Result, SyncError};
use crate::shared::messaging::{ConversationId, MessageId, RawMessage, RawRecord};

/// Event received from the push channel
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// `new message`
    NewMessage(RawMessage),
    /// `message updated`
    MessageUpdated(RawMessage),
    /// `message revoked`
    MessageRevoked {
        conversation_id: Option<ConversationId>,
        message_id: MessageId,
    },
    /// `message deleted`
    MessageDeleted {
        conversation_id: Option<ConversationId>,
        message_id: MessageId,
    },
    /// `typing`
    Typing {
        conversation_id: Option<ConversationId>,
        user_id: Option<i64>,
    },
    /// `message seen`
    MessageSeen {
        conversation_id: Option<ConversationId>,
        message_id: MessageId,
        user_id: Option<i64>,
    },
    /// `user online`
    UserOnline { user_id: i64 },
    /// `user offline`
    UserOffline { user_id: i64 },
    /// Anything else the server emits
    Other { name: String, payload: Value },
}

impl InboundEvent {
    /// Parse an event name and its payload
    pub fn parse(name: &str, payload: Value) -> Result<Self> {
        let raw = RawRecord::new(payload);
        let event = match name {
            "new message" => Self::NewMessage(raw),
            "message updated" => Self::MessageUpdated(raw),
            "message revoked" => Self::MessageRevoked {
                conversation_id: conversation_of(&raw),
                message_id: required_message_id(&raw, name)?,
            },
            "message deleted" => Self::MessageDeleted {
                conversation_id: conversation_of(&raw),
                message_id: required_message_id(&raw, name)?,
            },
            "typing" => Self::Typing {
                conversation_id: conversation_of(&raw),
                user_id: raw.first_i64(&["user_id", "sender"]),
            },
            "message seen" => Self::MessageSeen {
                conversation_id: conversation_of(&raw),
                message_id: required_message_id(&raw, name)?,
                user_id: raw.first_i64(&["user_id", "seen_by"]),
            },
            "user online" | "user offline" => {
                let user_id = raw
                    .first_i64(&["user_id", "id"])
                    .or_else(|| match &raw.0 {
                        Value::Number(n) => n.as_i64(),
                        _ => None,
                    })
                    .ok_or_else(|| SyncError::protocol(format!("'{}' without user_id", name)))?;
                if name == "user online" {
                    Self::UserOnline { user_id }
                } else {
                    Self::UserOffline { user_id }
                }
            }
            other => Self::Other {
                name: other.to_string(),
                payload: raw.0,
            },
        };
        Ok(event)
    }

    /// Conversation the event is scoped to, when it names one
    pub fn conversation_id(&self) -> Option<ConversationId> {
        match self {
            Self::NewMessage(raw) | Self::MessageUpdated(raw) => conversation_of(raw),
            Self::MessageRevoked { conversation_id, .. }
            | Self::MessageDeleted { conversation_id, .. }
            | Self::Typing { conversation_id, .. }
            | Self::MessageSeen { conversation_id, .. } => conversation_id.clone(),
            Self::UserOnline { .. } | Self::UserOffline { .. } | Self::Other { .. } => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::NewMessage(_) => "new message",
            Self::MessageUpdated(_) => "message updated",
            Self::MessageRevoked { .. } => "message revoked",
            Self::MessageDeleted { .. } => "message deleted",
            Self::Typing { .. } => "typing",
            Self::MessageSeen { .. } => "message seen",
            Self::UserOnline { .. } => "user online",
            Self::UserOffline { .. } => "user offline",
            Self::Other { name, .. } => name,
        }
    }
}

fn conversation_of(raw: &RawRecord) -> Option<ConversationId> {
    raw.first_string(&["conversation_id", "conversationId"])
        .map(ConversationId::new)
}

fn required_message_id(raw: &RawRecord, event: &str) -> Result<MessageId> {
    raw.first_string(&["message_id", "id"])
        .map(MessageId::new)
        .ok_or_else(|| SyncError::protocol(format!("'{}' without message_id", event)))
}

/// Event emitted to the push channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Join the room keyed by the conversation id
    JoinConversation { conversation_id: ConversationId },
    LeaveConversation { conversation_id: ConversationId },
    SendMessage {
        conversation_id: ConversationId,
        sender: i64,
        content: String,
    },
    Typing { conversation_id: ConversationId },
    MessageSeen {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    /// Delivery acknowledgement for a pushed message
    MessageReceived {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    RevokeMessage {
        conversation_id: ConversationId,
        message_id: MessageId,
        user_id: i64,
    },
    DeleteMessage {
        conversation_id: ConversationId,
        message_id: MessageId,
        user_id: i64,
    },
    UpdateMessage {
        conversation_id: ConversationId,
        message_id: MessageId,
        content: String,
    },
}

impl OutboundEvent {
    /// Event name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinConversation { .. } => "join conversation",
            Self::LeaveConversation { .. } => "leave conversation",
            Self::SendMessage { .. } => "send message",
            Self::Typing { .. } => "typing",
            Self::MessageSeen { .. } => "message seen",
            Self::MessageReceived { .. } => "message received",
            Self::RevokeMessage { .. } => "revoke message",
            Self::DeleteMessage { .. } => "delete message",
            Self::UpdateMessage { .. } => "update message",
        }
    }

    /// JSON payload on the wire
    pub fn payload(&self) -> Value {
        match self {
            Self::JoinConversation { conversation_id }
            | Self::LeaveConversation { conversation_id }
            | Self::Typing { conversation_id } => json!({ "conversation_id": conversation_id }),
            Self::SendMessage {
                conversation_id,
                sender,
                content,
            } => json!({
                "conversation_id": conversation_id,
                "sender": sender,
                "content": content,
            }),
            Self::MessageSeen {
                conversation_id,
                message_id,
            }
            | Self::MessageReceived {
                conversation_id,
                message_id,
            } => json!({
                "conversation_id": conversation_id,
                "message_id": message_id,
            }),
            Self::RevokeMessage {
                conversation_id,
                message_id,
                user_id,
            }
            | Self::DeleteMessage {
                conversation_id,
                message_id,
                user_id,
            } => json!({
                "conversation_id": conversation_id,
                "message_id": message_id,
                "user_id": user_id,
            }),
            Self::UpdateMessage {
                conversation_id,
                message_id,
                content,
            } => json!({
                "conversation_id": conversation_id,
                "message_id": message_id,
                "content": content,
            }),
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::JoinConversation { conversation_id }
            | Self::LeaveConversation { conversation_id }
            | Self::SendMessage { conversation_id, .. }
            | Self::Typing { conversation_id }
            | Self::MessageSeen { conversation_id, .. }
            | Self::MessageReceived { conversation_id, .. }
            | Self::RevokeMessage { conversation_id, .. }
            | Self::DeleteMessage { conversation_id, .. }
            | Self::UpdateMessage { conversation_id, .. } => conversation_id,
        }
    }
}
