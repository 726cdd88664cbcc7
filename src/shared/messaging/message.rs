//! Chat Message Data Structure
//!
//! The canonical message record every part of the engine works with. Raw
//! backend payloads never leave the normalizer; this is what they become.

use crate::shared::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

const TEMP_PREFIX: &str = "temp-";

/// Message identifier: the server id in string form, or a local `temp-` id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Temporary id for an optimistic entry created at `millis`
    pub fn temporary(millis: i64) -> Self {
        Self(format!("{}{}", TEMP_PREFIX, millis))
    }

    /// Whether this id was minted locally and still awaits confirmation
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<i32> for MessageId {
    fn from(id: i32) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Conversation identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Type of message content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text message
    #[default]
    Text,
    /// Image message (raw `image`/`image_text`)
    Image,
    /// File attachment (raw `file`/`pdf`)
    File,
}

/// Lifecycle status of a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Sent,
    /// Tombstone: content is gone but the entry keeps its place
    Revoked,
    /// Removed from the visible thread
    Deleted,
}

/// Represents a chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: i64,
    pub kind: MessageKind,
    /// Text body; empty for pure attachments and tombstones
    pub content: String,
    pub attachment_url: Option<String>,
    /// Display name for file attachments
    pub attachment_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    /// True while awaiting server confirmation
    pub is_optimistic: bool,
    /// Users who reported this message as seen
    #[serde(default)]
    pub seen_by: BTreeSet<i64>,
}

impl Message {
    /// Create a new text message
    pub fn text(
        id: impl Into<MessageId>,
        conversation_id: ConversationId,
        sender_id: i64,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            conversation_id,
            sender_id,
            kind: MessageKind::Text,
            content: content.into(),
            attachment_url: None,
            attachment_name: None,
            timestamp: Utc::now(),
            status: MessageStatus::Sent,
            is_optimistic: false,
            seen_by: BTreeSet::new(),
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.status == MessageStatus::Revoked
    }

    /// Get a preview of the message (first N characters)
    pub fn preview(&self, max_len: usize) -> String {
        if self.is_revoked() {
            return "Message revoked".to_string();
        }
        let body = match (self.kind, self.content.is_empty()) {
            (MessageKind::Image, true) => "[Image]".to_string(),
            (MessageKind::File, true) => self
                .attachment_name
                .clone()
                .unwrap_or_else(|| "[File]".to_string()),
            _ => self.content.clone(),
        };
        if body.chars().count() <= max_len {
            body
        } else {
            let mut preview: String = body.chars().take(max_len.saturating_sub(3)).collect();
            preview.push_str("...");
            preview
        }
    }

    /// Apply a partial update in place. Revoking always clears content and
    /// attachment fields, whatever else the patch carries.
    pub fn apply_patch(&mut self, patch: &MessagePatch) {
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        if let Some(url) = &patch.attachment_url {
            self.attachment_url = url.clone();
        }
        if let Some(name) = &patch.attachment_name {
            self.attachment_name = name.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if self.status == MessageStatus::Revoked {
            self.content.clear();
            self.attachment_url = None;
            self.attachment_name = None;
        }
    }
}

/// Partial update applied by `MergeStore::mutate`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub status: Option<MessageStatus>,
    pub attachment_url: Option<Option<String>>,
    pub attachment_name: Option<Option<String>>,
}

impl MessagePatch {
    /// Tombstone patch used by revoke
    pub fn revoke() -> Self {
        Self {
            content: Some(String::new()),
            status: Some(MessageStatus::Revoked),
            attachment_url: Some(None),
            attachment_name: Some(None),
        }
    }

    /// Content edit
    pub fn edit(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// File or image chosen for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Original human-readable file name
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn kind(&self) -> MessageKind {
        if self.mime_type.starts_with("image/") {
            MessageKind::Image
        } else {
            MessageKind::File
        }
    }
}

/// Outgoing message as composed by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingDraft {
    pub conversation_id: ConversationId,
    pub content: String,
    pub attachment: Option<Attachment>,
}

impl OutgoingDraft {
    pub fn text(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            content: content.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(conversation_id: ConversationId, attachment: Attachment) -> Self {
        Self {
            conversation_id,
            content: String::new(),
            attachment: Some(attachment),
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.attachment
            .as_ref()
            .map(Attachment::kind)
            .unwrap_or(MessageKind::Text)
    }

    /// Reject drafts that would send nothing
    pub fn validate(&self) -> Result<()> {
        if self.conversation_id.is_empty() {
            return Err(SyncError::validation(
                "conversation_id",
                "No conversation selected",
            ));
        }
        match &self.attachment {
            Some(attachment) if attachment.bytes.is_empty() => Err(SyncError::validation(
                "attachment",
                "Attachment is empty",
            )),
            Some(_) => Ok(()),
            None if self.content.trim().is_empty() => Err(SyncError::validation(
                "content",
                "Message cannot be empty",
            )),
            None => Ok(()),
        }
    }
}
