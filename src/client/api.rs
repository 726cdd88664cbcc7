//! Message REST API Client
//!
//! Async access to the backend's message, conversation and user-detail
//! endpoints. Every request carries the opaque bearer token from
//! [`Config`]; responses stay raw JSON until the normalizer sees them.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};

use crate::client::config::Config;
use crate::shared::error::{Result, SyncError};
use crate::shared::messaging::{
    Attachment, ConversationId, MessageId, MessageKind, RawConversation, RawMessage, RawPage,
    RawRecord,
};

/// Profile fields used for participant names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDetail {
    pub user_id: i64,
    pub display_name: String,
    pub avatar: Option<String>,
}

impl UserDetail {
    pub fn from_raw(user_id: i64, raw: &RawRecord) -> Self {
        let nested = raw.object("UserDetail");
        let display_name = raw
            .first_string(&["fullname", "full_name", "username", "name"])
            .or_else(|| nested.as_ref().and_then(|n| n.first_string(&["fullname", "username"])))
            .unwrap_or_else(|| format!("user {}", user_id));
        Self {
            user_id: raw.first_i64(&["user_id", "id"]).unwrap_or(user_id),
            display_name,
            avatar: raw.first_string(&["avatar", "avatar_url"]),
        }
    }
}

/// The REST collaborator the synchronization engine depends on
#[async_trait]
pub trait MessageBackend: Send + Sync {
    /// One history page; `cursor = None` asks for the newest page
    async fn fetch_page(&self, conversation_id: &ConversationId, cursor: Option<&str>) -> Result<RawPage>;

    async fn send_text(&self, conversation_id: &ConversationId, sender: i64, content: &str) -> Result<RawMessage>;

    /// Multipart upload of an image or file
    async fn send_attachment(
        &self,
        conversation_id: &ConversationId,
        sender: i64,
        attachment: &Attachment,
    ) -> Result<RawMessage>;

    async fn update_message(&self, message_id: &MessageId, content: &str) -> Result<()>;

    async fn revoke_message(&self, message_id: &MessageId, conversation_id: &ConversationId, user_id: i64) -> Result<()>;

    async fn delete_message(&self, message_id: &MessageId, conversation_id: &ConversationId, user_id: i64) -> Result<()>;

    async fn fetch_conversations(&self, user_id: i64) -> Result<Vec<RawConversation>>;

    /// Participant user ids of a conversation
    async fn fetch_participants(&self, conversation_id: &ConversationId) -> Result<Vec<i64>>;

    async fn fetch_user_detail(&self, user_id: i64) -> Result<UserDetail>;
}

/// reqwest-backed [`MessageBackend`]
#[derive(Debug, Clone)]
pub struct RestClient {
    config: Config,
    client: Client,
}

impl RestClient {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .config
            .get_token()
            .ok_or_else(|| SyncError::validation("token", "Not authenticated"))?;
        Ok(request.header("Authorization", format!("Bearer {}", token)))
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = self.config.api_url(path);
        tracing::debug!("[API] GET {}", url);
        let response = self.authorized(self.client.get(&url))?.send().await?;
        let response = check(response).await?;
        Ok(response.json::<Value>().await?)
    }

    async fn send_json(&self, request: RequestBuilder, body: &Value) -> Result<Value> {
        let response = self
            .authorized(request)?
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;
        let response = check(response).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Map non-success statuses onto the error taxonomy
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| status.to_string());
    let message = serde_json::from_str::<Value>(&error_text)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(error_text);
    tracing::warn!("[API] Request failed: {} - {}", status, message);
    match status.as_u16() {
        404 => Err(SyncError::NotFound(message)),
        code => Err(SyncError::server(code, message)),
    }
}

/// The sent message, whether returned bare or wrapped
fn unwrap_message(body: Value) -> RawMessage {
    let record = RawRecord::new(body);
    record
        .object("message")
        .or_else(|| record.object("data"))
        .unwrap_or(record)
}

fn list_of(body: Value, keys: &[&str]) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => keys
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn participant_ids(body: Value) -> Vec<i64> {
    let items = match body {
        Value::Object(ref map) if !map.contains_key("participants") => {
            map.get("data").cloned().map(|d| list_of(d, &["participants"])).unwrap_or_default()
        }
        other => list_of(other, &["participants"]),
    };
    items
        .into_iter()
        .filter_map(|item| match &item {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            Value::Object(_) => RawRecord::new(item.clone()).first_i64(&["user_id", "id"]),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl MessageBackend for RestClient {
    async fn fetch_page(&self, conversation_id: &ConversationId, cursor: Option<&str>) -> Result<RawPage> {
        let mut path = format!("/api/messages/{}", urlencoding::encode(conversation_id.as_str()));
        if let Some(cursor) = cursor {
            path.push_str(&format!("?lastKey={}", urlencoding::encode(cursor)));
        }
        let body = self.get_json(&path).await?;
        let page = RawPage::from_value(body);
        tracing::debug!(
            "[API] Page for {} with {} messages, more: {}",
            conversation_id,
            page.messages.len(),
            page.next_cursor.is_some()
        );
        Ok(page)
    }

    async fn send_text(&self, conversation_id: &ConversationId, sender: i64, content: &str) -> Result<RawMessage> {
        tracing::info!(
            "[API] Sending message: conversation={}, content_preview='{}'",
            conversation_id,
            content.chars().take(50).collect::<String>()
        );
        let url = self.config.api_url("/api/messages/add");
        let body = json!({
            "conversation_id": conversation_id,
            "sender": sender,
            "content": content,
            "type": "text",
        });
        let response = self.send_json(self.client.post(&url), &body).await?;
        Ok(unwrap_message(response))
    }

    async fn send_attachment(
        &self,
        conversation_id: &ConversationId,
        sender: i64,
        attachment: &Attachment,
    ) -> Result<RawMessage> {
        let field = match attachment.kind() {
            MessageKind::Image => "image",
            _ => "file",
        };
        tracing::info!(
            "[API] Uploading {} '{}' ({} bytes) to {}",
            field,
            attachment.file_name,
            attachment.bytes.len(),
            conversation_id
        );
        let part = Part::bytes(attachment.bytes.clone())
            .file_name(attachment.file_name.clone())
            .mime_str(&attachment.mime_type)?;
        let form = Form::new()
            .part(field, part)
            .text("conversation_id", conversation_id.to_string())
            .text("sender", sender.to_string());

        let url = self.config.api_url("/api/messages/sendImage");
        let response = self
            .authorized(self.client.post(&url))?
            .multipart(form)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(unwrap_message(response.json::<Value>().await?))
    }

    async fn update_message(&self, message_id: &MessageId, content: &str) -> Result<()> {
        let url = self.config.api_url(&format!("/api/messages/{}/update", message_id));
        self.send_json(self.client.put(&url), &json!({ "content": content }))
            .await?;
        Ok(())
    }

    async fn revoke_message(&self, message_id: &MessageId, conversation_id: &ConversationId, user_id: i64) -> Result<()> {
        let url = self.config.api_url(&format!("/api/messages/{}/revoke", message_id));
        let body = json!({ "user_id": user_id, "conversation_id": conversation_id });
        self.send_json(self.client.put(&url), &body).await?;
        Ok(())
    }

    async fn delete_message(&self, message_id: &MessageId, conversation_id: &ConversationId, user_id: i64) -> Result<()> {
        let url = self.config.api_url(&format!("/api/messages/{}", message_id));
        let body = json!({ "user_id": user_id, "conversation_id": conversation_id });
        self.send_json(self.client.delete(&url), &body).await?;
        Ok(())
    }

    async fn fetch_conversations(&self, user_id: i64) -> Result<Vec<RawConversation>> {
        let body = self
            .get_json(&format!("/api/conversations/user/{}", user_id))
            .await?;
        Ok(list_of(body, &["conversations", "data"])
            .into_iter()
            .map(RawConversation::new)
            .collect())
    }

    async fn fetch_participants(&self, conversation_id: &ConversationId) -> Result<Vec<i64>> {
        let body = self
            .get_json(&format!(
                "/api/conversations/{}",
                urlencoding::encode(conversation_id.as_str())
            ))
            .await?;
        Ok(participant_ids(body))
    }

    async fn fetch_user_detail(&self, user_id: i64) -> Result<UserDetail> {
        let body = self.get_json(&format!("/api/userDetails/{}", user_id)).await?;
        Ok(UserDetail::from_raw(user_id, &RawRecord::new(body)))
    }
}
