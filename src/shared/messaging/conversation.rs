//! Conversation Data Structure
//!
//! Summary of a conversation as shown in the conversation list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{ConversationId, Message, MessageId, MessageStatus};
use super::raw::RawConversation;

const UNKNOWN_NAME: &str = "Unknown User";
const PREVIEW_LEN: usize = 80;

/// Snapshot of the newest message, used for previews and recency sorting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub message_id: Option<MessageId>,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub status: MessageStatus,
}

impl LastMessage {
    pub fn from_message(message: &Message) -> Self {
        Self {
            message_id: Some(message.id.clone()),
            content: message.preview(PREVIEW_LEN),
            timestamp: Some(message.timestamp),
            status: message.status,
        }
    }
}

/// Represents a conversation between users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    /// Group name, when the backend provides one
    pub group_name: Option<String>,
    /// Participant identities (user ids or names, as the backend lists them)
    pub participants: Vec<String>,
    pub last_message: Option<LastMessage>,
    pub avatar: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn new(id: ConversationId, participants: Vec<String>) -> Self {
        Self {
            id,
            group_name: None,
            participants,
            last_message: None,
            avatar: None,
            created_at: None,
        }
    }

    /// Parse one entry of the conversation-list endpoint. Returns `None`
    /// when the entry carries no usable id.
    pub fn from_raw(raw: &RawConversation) -> Option<Self> {
        let id = raw.first_string(&["conversation_id", "id", "_id"])?;
        let last_message = match raw.object("lastMessage").or_else(|| raw.object("last_message")) {
            Some(object) => Some(LastMessage {
                message_id: object
                    .first_string(&["id", "message_id"])
                    .map(MessageId::new),
                content: object.first_string(&["content"]).unwrap_or_default(),
                timestamp: object
                    .first_string(&["updated_at", "created_at", "timestamp"])
                    .and_then(|s| parse_timestamp(&s)),
                status: parse_status(object.first_string(&["status"]).as_deref()),
            }),
            None => raw
                .first_string(&["lastMessage", "last_message"])
                .map(|content| LastMessage {
                    message_id: None,
                    content,
                    timestamp: None,
                    status: MessageStatus::Sent,
                }),
        };

        Some(Self {
            id: ConversationId::new(id),
            group_name: raw.first_string(&["group_name", "name"]),
            participants: raw.string_list("participants"),
            last_message,
            avatar: raw.first_string(&["avatar", "avatar_url"]),
            created_at: raw
                .first_string(&["created_at", "createdAt"])
                .and_then(|s| parse_timestamp(&s)),
        })
    }

    /// Group name, else participants joined, else a placeholder
    pub fn display_name(&self) -> String {
        if let Some(name) = self.group_name.as_ref().filter(|n| !n.trim().is_empty()) {
            return name.clone();
        }
        if self.participants.is_empty() {
            UNKNOWN_NAME.to_string()
        } else {
            self.participants.join(", ")
        }
    }

    /// Time used for recency ordering
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_message
            .as_ref()
            .and_then(|m| m.timestamp)
            .or(self.created_at)
    }

    /// Check if an identity is a participant
    pub fn has_participant(&self, identity: &str) -> bool {
        self.participants.iter().any(|p| p == identity)
    }
}

pub(crate) fn parse_status(raw: Option<&str>) -> MessageStatus {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("revoked") => MessageStatus::Revoked,
        Some("deleted") => MessageStatus::Deleted,
        _ => MessageStatus::Sent,
    }
}

/// RFC 3339 text or unix milliseconds
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw.trim()) {
        return Some(parsed.with_timezone(&Utc));
    }
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}
