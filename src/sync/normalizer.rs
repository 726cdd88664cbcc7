//! # Message Normalizer
//!
//! Maps heterogeneous backend payloads onto the canonical [`Message`].
//! This is the only place that knows the backend's alternative field names.
//!
//! ## Resolution rules
//!
//! - **Kind**: `type` or `message_type`, case-insensitive; `image_text`
//!   collapses to `Image`, `pdf` to `File`. Without a type, the presence of
//!   `image_url` / `file_url` decides.
//! - **Attachment URL**: first non-empty of `url`, `s3_url`, `file_url`,
//!   `image_url` (image and file kinds only).
//! - **Attachment name** (file kind): remembered name for the URL, else the
//!   content when it looks like a file name, else the URL's last segment.
//! - Nothing here fails; missing fields fall back to safe defaults.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;

use crate::shared::messaging::conversation::{parse_status, parse_timestamp};
use crate::shared::messaging::raw::{CONVERSATION_ID_KEYS, MESSAGE_ID_KEYS};
use crate::shared::messaging::{
    ConversationId, Message, MessageId, MessageKind, MessagePatch, MessageStatus, RawMessage,
};

const URL_KEYS: &[&str] = &["url", "s3_url", "file_url", "image_url"];
const GENERIC_DOCUMENT: &str = "Document";

/// Original file names of uploaded attachments, keyed by resolved URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentNames {
    names: HashMap<String, String>,
}

impl AttachmentNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&mut self, url: impl Into<String>, name: impl Into<String>) {
        self.names.insert(url.into(), name.into());
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.names.get(url).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names.iter().map(|(url, name)| (url.as_str(), name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl From<HashMap<String, String>> for AttachmentNames {
    fn from(names: HashMap<String, String>) -> Self {
        Self { names }
    }
}

/// Raw payload to canonical message conversion
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    names: AttachmentNames,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_names(names: AttachmentNames) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &AttachmentNames {
        &self.names
    }

    /// Record the human-readable name of an uploaded attachment
    pub fn remember_name(&mut self, url: impl Into<String>, name: impl Into<String>) {
        self.names.remember(url, name);
    }

    pub fn normalize(&self, raw: &RawMessage) -> Message {
        self.normalize_in(raw, None)
    }

    /// Normalize a payload that may omit its conversation id, e.g. history
    /// pages fetched for a known conversation. Push payloads wrapped as
    /// `{conversation_id, message}` are unwrapped first.
    pub fn normalize_in(&self, raw: &RawMessage, conversation: Option<&ConversationId>) -> Message {
        let body = raw.message_body();
        let raw: &RawMessage = &body;

        let kind = resolve_kind(raw);
        let sender_id = raw.first_i64(&["sender", "sender_id", "user_id"]).unwrap_or(0);
        let raw_timestamp = raw.first_string(&["timestamp", "created_at", "createdAt"]);
        let timestamp = raw_timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        let conversation_id = raw
            .first_string(CONVERSATION_ID_KEYS)
            .map(ConversationId::new)
            .or_else(|| conversation.cloned())
            .unwrap_or_else(|| ConversationId::new(""));
        let content = raw.first_string(&["content"]).unwrap_or_default();
        let id = raw
            .first_string(MESSAGE_ID_KEYS)
            .map(MessageId::new)
            .unwrap_or_else(|| {
                fallback_id(sender_id, &conversation_id, &content, raw_timestamp.as_deref(), raw)
            });

        let attachment_url = match kind {
            MessageKind::Text => None,
            MessageKind::Image | MessageKind::File => raw.first_string(URL_KEYS),
        };
        let attachment_name = match (kind, attachment_url.as_deref()) {
            (MessageKind::File, url) => self.resolve_file_name(&content, url),
            _ => None,
        };

        let mut message = Message {
            id,
            conversation_id,
            sender_id,
            kind,
            content,
            attachment_url,
            attachment_name,
            timestamp,
            status: parse_status(raw.first_string(&["status"]).as_deref()),
            is_optimistic: false,
            seen_by: Default::default(),
        };
        if message.status == MessageStatus::Revoked {
            message.content.clear();
            message.attachment_url = None;
            message.attachment_name = None;
        }
        message
    }

    /// Partial update carried by a `message updated` payload. Only the
    /// fields the payload actually has are patched; `None` without an id.
    pub fn normalize_update(&self, raw: &RawMessage) -> Option<(MessageId, MessagePatch)> {
        let body = raw.message_body();
        let raw: &RawMessage = &body;
        let id = raw.first_string(MESSAGE_ID_KEYS).map(MessageId::new)?;
        let mut patch = MessagePatch::default();
        if let Some(content) = raw.0.get("content").and_then(Value::as_str) {
            patch.content = Some(content.to_string());
        }
        if let Some(status) = raw.first_string(&["status"]) {
            patch.status = Some(parse_status(Some(&status)));
        }
        Some((id, patch))
    }

    fn resolve_file_name(&self, content: &str, url: Option<&str>) -> Option<String> {
        if let Some(name) = url.and_then(|u| self.names.get(u)) {
            return Some(name.to_string());
        }
        if looks_like_file_name(content) {
            return Some(content.trim().to_string());
        }
        url.and_then(file_name_from_url)
    }
}

/// Id for a payload the backend sent without one. Derived from the payload
/// alone so a replayed event lands on the same entry.
fn fallback_id(
    sender_id: i64,
    conversation_id: &ConversationId,
    content: &str,
    raw_timestamp: Option<&str>,
    raw: &RawMessage,
) -> MessageId {
    let fingerprint = serde_json::json!([
        conversation_id.as_str(),
        sender_id,
        content,
        raw_timestamp,
        raw.first_string(URL_KEYS),
    ]);
    let digest = uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, fingerprint.to_string().as_bytes());
    MessageId::new(format!("anon-{}-{}", sender_id, digest.simple()))
}

fn resolve_kind(raw: &RawMessage) -> MessageKind {
    let declared = raw
        .first_string(&["type", "message_type"])
        .map(|t| t.trim().to_ascii_lowercase());
    match declared.as_deref() {
        Some("text") => MessageKind::Text,
        Some("image") | Some("image_text") => MessageKind::Image,
        Some("file") | Some("pdf") => MessageKind::File,
        _ if raw.has("image_url") => MessageKind::Image,
        _ if raw.has("file_url") => MessageKind::File,
        _ => MessageKind::Text,
    }
}

/// A single line with a short alphanumeric extension, e.g. `report.pdf`
fn looks_like_file_name(content: &str) -> bool {
    let trimmed = content.trim();
    if trimmed.is_empty() || trimmed.contains(['/', '\n']) {
        return false;
    }
    match trimmed.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// Last path segment of a URL, decoded, with UUID-shaped names replaced
pub fn file_name_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    if segment.is_empty() || segment.contains(':') {
        return None;
    }
    let decoded = urlencoding::decode(segment)
        .map(|name| name.into_owned())
        .unwrap_or_else(|_| segment.to_string());

    let (stem, ext) = match decoded.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), Some(ext.to_string())),
        _ => (decoded.clone(), None),
    };
    let with_ext = |base: &str| match &ext {
        Some(ext) => format!("{}.{}", base, ext),
        None => base.to_string(),
    };

    if uuid::Uuid::try_parse(&stem).is_ok() {
        return Some(with_ext(GENERIC_DOCUMENT));
    }
    // "<uuid>-original name.ext" keeps the original part
    if stem.len() > 37 && stem.is_char_boundary(36) && uuid::Uuid::try_parse(&stem[..36]).is_ok() {
        let rest = stem[36..].trim_start_matches(['-', '_']);
        if !rest.is_empty() {
            return Some(with_ext(rest));
        }
        return Some(with_ext(GENERIC_DOCUMENT));
    }
    Some(decoded)
}
