//! In-memory collaborators for driving `ChatSession` without a server

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use webchat_sync::client::{MessageBackend, PushChannel, UserDetail};
use webchat_sync::shared::error::{Result, SyncError};
use webchat_sync::shared::event::OutboundEvent;
use webchat_sync::shared::messaging::{
    Attachment, ConversationId, MessageId, MessageKind, RawConversation, RawMessage, RawPage,
};

/// Scripted REST backend. Queued responses are consumed in order; when a
/// queue is empty a plausible default is returned. Every call is logged.
pub struct FakeBackend {
    pages: Mutex<VecDeque<Result<RawPage>>>,
    sends: Mutex<VecDeque<Result<RawMessage>>>,
    conversations: Mutex<Vec<RawConversation>>,
    participants: Mutex<Vec<i64>>,
    users: Mutex<HashMap<i64, UserDetail>>,
    fail_mutations: AtomicBool,
    next_id: AtomicI64,
    calls: Mutex<Vec<String>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            pages: Mutex::default(),
            sends: Mutex::default(),
            conversations: Mutex::default(),
            participants: Mutex::default(),
            users: Mutex::default(),
            fail_mutations: AtomicBool::new(false),
            next_id: AtomicI64::new(1000),
            calls: Mutex::default(),
        }
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&self, page: Result<RawPage>) {
        self.pages.lock().unwrap().push_back(page);
    }

    pub fn push_send(&self, result: Result<RawMessage>) {
        self.sends.lock().unwrap().push_back(result);
    }

    pub fn set_conversations(&self, conversations: Vec<RawConversation>) {
        *self.conversations.lock().unwrap() = conversations;
    }

    pub fn set_participants(&self, ids: Vec<i64>) {
        *self.participants.lock().unwrap() = ids;
    }

    pub fn add_user(&self, user_id: i64, name: &str) {
        self.users.lock().unwrap().insert(
            user_id,
            UserDetail {
                user_id,
                display_name: name.to_string(),
                avatar: None,
            },
        );
    }

    /// Make update, revoke and delete answer with a server error
    pub fn fail_mutations(&self) {
        self.fail_mutations.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls whose log entry starts with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn mutation(&self) -> Result<()> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(SyncError::server(500, "Internal error"));
        }
        Ok(())
    }

    fn next_send(&self, default: impl FnOnce(i64) -> RawMessage) -> Result<RawMessage> {
        match self.sends.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(default(self.next_id.fetch_add(1, Ordering::SeqCst))),
        }
    }
}

#[async_trait]
impl MessageBackend for FakeBackend {
    async fn fetch_page(&self, conversation_id: &ConversationId, cursor: Option<&str>) -> Result<RawPage> {
        self.record(format!("fetch_page {} {}", conversation_id, cursor.unwrap_or("-")));
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RawPage::default()))
    }

    async fn send_text(&self, conversation_id: &ConversationId, sender: i64, content: &str) -> Result<RawMessage> {
        self.record(format!("send_text {}", conversation_id));
        self.next_send(|id| {
            RawMessage::new(json!({
                "id": id,
                "conversation_id": conversation_id,
                "sender": sender,
                "content": content,
                "type": "text",
                "created_at": "2024-05-01T11:00:00Z",
            }))
        })
    }

    async fn send_attachment(
        &self,
        conversation_id: &ConversationId,
        sender: i64,
        attachment: &Attachment,
    ) -> Result<RawMessage> {
        self.record(format!("send_attachment {}", conversation_id));
        let kind = match attachment.kind() {
            MessageKind::Image => "image",
            _ => "file",
        };
        let extension = attachment
            .file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_string())
            .unwrap_or_default();
        self.next_send(|id| {
            RawMessage::new(json!({
                "id": id,
                "conversation_id": conversation_id,
                "sender": sender,
                "type": kind,
                "content": "",
                "url": format!("https://cdn.test/uploads/0b7e3f2a-5d1c-4e8b-9a6f-1c2d3e4f5a6b.{}", extension),
                "created_at": "2024-05-01T11:00:00Z",
            }))
        })
    }

    async fn update_message(&self, message_id: &MessageId, _content: &str) -> Result<()> {
        self.record(format!("update_message {}", message_id));
        self.mutation()
    }

    async fn revoke_message(&self, message_id: &MessageId, _conversation_id: &ConversationId, _user_id: i64) -> Result<()> {
        self.record(format!("revoke_message {}", message_id));
        self.mutation()
    }

    async fn delete_message(&self, message_id: &MessageId, _conversation_id: &ConversationId, _user_id: i64) -> Result<()> {
        self.record(format!("delete_message {}", message_id));
        self.mutation()
    }

    async fn fetch_conversations(&self, user_id: i64) -> Result<Vec<RawConversation>> {
        self.record(format!("fetch_conversations {}", user_id));
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn fetch_participants(&self, conversation_id: &ConversationId) -> Result<Vec<i64>> {
        self.record(format!("fetch_participants {}", conversation_id));
        Ok(self.participants.lock().unwrap().clone())
    }

    async fn fetch_user_detail(&self, user_id: i64) -> Result<UserDetail> {
        self.record(format!("fetch_user_detail {}", user_id));
        self.users
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("user {}", user_id)))
    }
}

/// Push channel that keeps every emitted event; can be taken offline
#[derive(Default)]
pub struct RecordingChannel {
    events: Mutex<Vec<OutboundEvent>>,
    offline: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<OutboundEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().iter().filter(|n| **n == name).count()
    }
}

impl PushChannel for RecordingChannel {
    fn emit(&self, event: OutboundEvent) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
