//! Raw Backend Payloads
//!
//! The backend names the same concept several ways (`id`/`message_id`,
//! `type`/`message_type`, four different URL keys) and mixes numbers and
//! strings for ids. These wrappers keep that mess in one place; only the
//! normalizer and the REST client read field names through them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// Keys a message id may arrive under
pub const MESSAGE_ID_KEYS: &[&str] = &["id", "message_id", "_id"];

/// Keys a conversation id may arrive under
pub const CONVERSATION_ID_KEYS: &[&str] = &["conversation_id", "conversationId"];

/// A record exactly as the backend sent it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Value);

/// Message payload from a history page, a send response or a push event
pub type RawMessage = RawRecord;

/// Entry of the conversation-list endpoint
pub type RawConversation = RawRecord;

impl RawRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// First key holding a non-empty string or a number, as a string
    pub fn first_string(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| value_as_string(self.0.get(*key)?))
    }

    /// First key holding an integer or an integer-looking string
    pub fn first_i64(&self, keys: &[&str]) -> Option<i64> {
        keys.iter().find_map(|key| match self.0.get(*key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    /// Nested object under `key`, if any
    pub fn object(&self, key: &str) -> Option<RawRecord> {
        match self.0.get(key)? {
            value @ Value::Object(_) => Some(RawRecord(value.clone())),
            _ => None,
        }
    }

    /// The message a push payload carries, bare or wrapped as
    /// `{conversation_id, message: {...}}`. An inner record without a
    /// conversation id takes the outer one.
    pub fn message_body(&self) -> Cow<'_, RawRecord> {
        if self.first_string(MESSAGE_ID_KEYS).is_some() {
            return Cow::Borrowed(self);
        }
        let Some(mut inner) = self.object("message") else {
            return Cow::Borrowed(self);
        };
        if inner.first_string(CONVERSATION_ID_KEYS).is_none() {
            if let (Some(conversation_id), Value::Object(map)) =
                (self.first_string(CONVERSATION_ID_KEYS), &mut inner.0)
            {
                map.insert("conversation_id".to_string(), Value::String(conversation_id));
            }
        }
        Cow::Owned(inner)
    }

    pub fn has(&self, key: &str) -> bool {
        self.0
            .get(key)
            .map(|v| value_as_string(v).is_some())
            .unwrap_or(false)
    }

    /// Array under `key` with non-empty string or numeric elements
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items.iter().filter_map(value_as_string).collect(),
            _ => Vec::new(),
        }
    }
}

impl From<Value> for RawRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// One page of history as returned by the backend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPage {
    /// Newest first, as the backend orders them
    pub messages: Vec<RawMessage>,
    /// Opaque "last key"; `None` means start of history reached
    pub next_cursor: Option<String>,
}

impl RawPage {
    /// Accepts a bare array (no cursor) or an object carrying the messages
    /// under `messages`/`data` and the cursor under `lastKey`/`last_key`/`nextCursor`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => Self {
                messages: items.into_iter().map(RawRecord).collect(),
                next_cursor: None,
            },
            Value::Object(mut map) => {
                let messages = ["messages", "data", "items"]
                    .iter()
                    .find_map(|key| match map.remove(*key) {
                        Some(Value::Array(items)) => Some(items),
                        _ => None,
                    })
                    .unwrap_or_default()
                    .into_iter()
                    .map(RawRecord)
                    .collect();
                let next_cursor = ["lastKey", "last_key", "nextCursor", "next_cursor"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(value_as_string));
                Self {
                    messages,
                    next_cursor,
                }
            }
            _ => Self::default(),
        }
    }
}

/// Strings are accepted when non-empty; numbers are printed; objects (some
/// backends return a composite DynamoDB-style key) are kept as compact JSON.
fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) if !map.is_empty() => Some(value.to_string()),
        _ => None,
    }
}
