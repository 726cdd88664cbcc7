//! # Chat Session
//!
//! Ties the engine together for one signed-in user: the conversation list,
//! the open conversation (merge store, cursor, pending sends), the live
//! event router and the attachment-name cache. Collaborators are injected:
//! a [`MessageBackend`] for REST and a [`PushChannel`] for outbound events.
//!
//! Opening another conversation discards the previous conversation's store,
//! cursor and pending sends. Responses that arrive for a discarded
//! conversation are dropped.
//!
//! Long operations come in two halves (`begin_*` then `apply_page` /
//! `finish_send`) so a caller can run the network call without holding the
//! session. The `load_older` / `send` helpers run both halves in sequence.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::client::api::{MessageBackend, UserDetail};
use crate::client::socket::{ChannelUpdate, ConnectionStatus, PushChannel};
use crate::shared::error::{Result, SyncError};
use crate::shared::event::{InboundEvent, OutboundEvent};
use crate::shared::messaging::{
    Attachment, ConversationId, Message, MessageId, MessageKind, MessagePatch, OutgoingDraft,
    RawMessage, RawPage,
};
use crate::storage::NameCacheDb;
use crate::sync::conversations::ConversationList;
use crate::sync::cursor::{CursorTracker, FetchTicket};
use crate::sync::normalizer::{AttachmentNames, Normalizer};
use crate::sync::optimistic::SendTracker;
use crate::sync::router::{LiveEventRouter, PresenceMap, RouteOutcome};
use crate::sync::store::MergeStore;

const UNKNOWN_USER: &str = "unknown user";

/// State private to the conversation currently on screen
#[derive(Debug)]
struct ActiveConversation {
    id: ConversationId,
    store: MergeStore,
    cursor: CursorTracker,
    sends: SendTracker,
}

impl ActiveConversation {
    fn new(id: ConversationId, local_user_id: i64) -> Self {
        Self {
            cursor: CursorTracker::new(id.clone()),
            id,
            store: MergeStore::new(),
            sends: SendTracker::new(local_user_id),
        }
    }
}

/// Deliver a draft over REST: multipart for attachments, JSON otherwise
pub async fn deliver<B: MessageBackend + ?Sized>(
    backend: &B,
    sender: i64,
    draft: &OutgoingDraft,
) -> Result<RawMessage> {
    match &draft.attachment {
        Some(attachment) => {
            backend
                .send_attachment(&draft.conversation_id, sender, attachment)
                .await
        }
        None => {
            backend
                .send_text(&draft.conversation_id, sender, &draft.content)
                .await
        }
    }
}

pub struct ChatSession<B: MessageBackend, C: PushChannel> {
    backend: Arc<B>,
    channel: C,
    local_user_id: i64,
    normalizer: Normalizer,
    name_cache: Option<NameCacheDb>,
    conversations: ConversationList,
    router: LiveEventRouter,
    active: Option<ActiveConversation>,
    connection: ConnectionStatus,
    ever_connected: bool,
}

impl<B: MessageBackend, C: PushChannel> ChatSession<B, C> {
    pub fn new(backend: Arc<B>, channel: C, local_user_id: i64, typing_timeout: Duration) -> Self {
        Self {
            backend,
            channel,
            local_user_id,
            normalizer: Normalizer::new(),
            name_cache: None,
            conversations: ConversationList::new(),
            router: LiveEventRouter::new(typing_timeout),
            active: None,
            connection: ConnectionStatus::Disconnected,
            ever_connected: false,
        }
    }

    /// Load persisted attachment names and keep the database for new ones.
    /// Returns how many names were loaded.
    pub async fn attach_name_cache(&mut self, db: NameCacheDb) -> Result<usize> {
        let stored = db.load_all().await?;
        let count = stored.len();
        let mut names: AttachmentNames = stored.into();
        for (url, name) in self.normalizer.names().iter() {
            names.remember(url, name);
        }
        self.normalizer = Normalizer::with_names(names);
        self.name_cache = Some(db);
        tracing::info!("[CACHE] Loaded {} attachment names", count);
        Ok(count)
    }

    pub fn backend(&self) -> Arc<B> {
        Arc::clone(&self.backend)
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn local_user_id(&self) -> i64 {
        self.local_user_id
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn conversations(&self) -> &ConversationList {
        &self.conversations
    }

    pub fn connection_status(&self) -> &ConnectionStatus {
        &self.connection
    }

    pub fn presence(&self) -> &PresenceMap {
        self.router.presence()
    }

    pub fn typing_user(&self, now: Instant) -> Option<i64> {
        self.router.typing().typing_user(now)
    }

    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.active.as_ref().map(|a| &a.id)
    }

    /// The open conversation's messages in display order
    pub fn messages(&self) -> Vec<&Message> {
        self.active
            .as_ref()
            .map(|a| a.store.iter().collect())
            .unwrap_or_default()
    }

    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.active.as_ref().and_then(|a| a.store.get(id))
    }

    pub fn has_more(&self) -> bool {
        self.active.as_ref().map(|a| a.cursor.has_more()).unwrap_or(false)
    }

    pub fn is_loading(&self) -> bool {
        self.active.as_ref().map(|a| a.cursor.is_loading()).unwrap_or(false)
    }

    fn require_active(&mut self) -> Result<&mut ActiveConversation> {
        self.active
            .as_mut()
            .ok_or_else(|| SyncError::validation("conversation_id", "No conversation selected"))
    }

    /// Fetch the user's conversations, rebuild the list and join every
    /// listed room so previews stay live
    pub async fn refresh_conversations(&mut self) -> Result<usize> {
        let raw = self.backend.fetch_conversations(self.local_user_id).await?;
        self.conversations.replace_all(&raw);
        let rooms = self.conversations.iter().map(|c| c.id.clone());
        if let Err(e) = self.router.watch_all(rooms, &self.channel) {
            tracing::warn!("[SYNC] Joining listed rooms not delivered: {}", e);
        }
        Ok(self.conversations.len())
    }

    /// Switch to `conversation_id` with fresh state. The room switch is
    /// best effort: a channel that is down rejoins on reconnect.
    pub fn open(&mut self, conversation_id: ConversationId) -> Result<()> {
        if conversation_id.is_empty() {
            return Err(SyncError::validation("conversation_id", "Missing conversation id"));
        }
        if self.active_conversation() == Some(&conversation_id) {
            return Ok(());
        }
        tracing::info!("[SYNC] Opening conversation {}", conversation_id);
        self.active = Some(ActiveConversation::new(conversation_id.clone(), self.local_user_id));
        if let Err(e) = self.router.switch_to(conversation_id, &self.channel) {
            tracing::warn!("[SYNC] Room switch not delivered: {}", e);
        }
        Ok(())
    }

    pub fn close(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::info!("[SYNC] Closing conversation {}", active.id);
        }
        if let Err(e) = self.router.unsubscribe(&self.channel) {
            tracing::warn!("[SYNC] Leave not delivered: {}", e);
        }
    }

    /// Start a history fetch for the open conversation
    pub fn begin_load_older(&mut self) -> Option<FetchTicket> {
        self.active.as_mut()?.cursor.begin()
    }

    /// Apply the outcome of a history fetch. Results for a conversation that
    /// is no longer open are dropped (`Ok(0)`); failures release the
    /// in-flight slot and are returned.
    pub fn apply_page(&mut self, ticket: &FetchTicket, result: Result<RawPage>) -> Result<usize> {
        let Some(active) = self.active.as_mut().filter(|a| &a.id == ticket.conversation_id()) else {
            tracing::debug!("[SYNC] Dropping page for closed conversation {}", ticket.conversation_id());
            return Ok(0);
        };
        let page = match result {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("[SYNC] History fetch for {} failed: {}", active.id, e);
                active.cursor.abort(ticket);
                return Err(e);
            }
        };
        match active.cursor.complete(ticket, page, &self.normalizer) {
            Some(messages) => Ok(active.store.insert_history(messages)),
            None => Ok(0),
        }
    }

    /// Load the next older page; `Ok(0)` when nothing was fetched
    pub async fn load_older(&mut self) -> Result<usize> {
        let Some(ticket) = self.begin_load_older() else {
            return Ok(0);
        };
        let backend = self.backend();
        let result = backend
            .fetch_page(ticket.conversation_id(), ticket.cursor())
            .await;
        self.apply_page(&ticket, result)
    }

    /// Show `draft` immediately under a temporary id
    pub fn begin_send(&mut self, draft: OutgoingDraft) -> Result<MessageId> {
        let active = self.require_active()?;
        if draft.conversation_id != active.id {
            return Err(SyncError::validation(
                "conversation_id",
                "Draft belongs to another conversation",
            ));
        }
        active.sends.begin_send(&mut active.store, draft)
    }

    pub fn pending_draft(&self, temp_id: &MessageId) -> Option<&OutgoingDraft> {
        self.active
            .as_ref()
            .and_then(|a| a.sends.pending(temp_id))
            .map(|p| &p.draft)
    }

    /// Settle a send started with [`ChatSession::begin_send`]. A failure
    /// rolls the provisional entry back and is returned for the caller to
    /// report; nothing is retried.
    pub async fn finish_send(
        &mut self,
        temp_id: &MessageId,
        result: Result<RawMessage>,
    ) -> Result<Option<Message>> {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                if let Some(active) = self.active.as_mut() {
                    active.sends.fail_send(&mut active.store, temp_id);
                }
                return Err(e);
            }
        };
        let Some(active) = self.active.as_mut() else {
            return Ok(None);
        };
        let file_name = active
            .sends
            .pending(temp_id)
            .and_then(|p| p.draft.attachment.as_ref())
            .map(|a| a.file_name.clone());
        let server = self.normalizer.normalize_in(&raw, Some(&active.id));
        let Some(confirmed) = active.sends.confirm_send(&mut active.store, temp_id, server) else {
            return Ok(None);
        };

        if let (Some(url), Some(name)) = (confirmed.attachment_url.as_deref(), file_name) {
            self.remember_attachment_name(url, &name).await;
        }
        self.conversations.apply_new_message(&confirmed);
        let notify = OutboundEvent::SendMessage {
            conversation_id: confirmed.conversation_id.clone(),
            sender: self.local_user_id,
            content: confirmed.content.clone(),
        };
        if let Err(e) = self.channel.emit(notify) {
            tracing::warn!("[SYNC] Send notification not delivered: {}", e);
        }
        Ok(Some(confirmed))
    }

    async fn remember_attachment_name(&mut self, url: &str, name: &str) {
        self.normalizer.remember_name(url, name);
        if let Some(db) = &self.name_cache {
            if let Err(e) = db.remember(url, name).await {
                tracing::warn!("[CACHE] Failed to persist name for {}: {}", url, e);
            }
        }
    }

    /// Optimistic send followed by delivery. `Ok(None)` means the server
    /// accepted the message after its conversation was closed.
    pub async fn send(&mut self, draft: OutgoingDraft) -> Result<Option<Message>> {
        let temp_id = self.begin_send(draft.clone())?;
        let backend = self.backend();
        let result = deliver(backend.as_ref(), self.local_user_id, &draft).await;
        self.finish_send(&temp_id, result).await
    }

    pub async fn send_text(&mut self, content: &str) -> Result<Option<Message>> {
        let conversation_id = self.require_active()?.id.clone();
        self.send(OutgoingDraft::text(conversation_id, content)).await
    }

    pub async fn send_attachment(&mut self, attachment: Attachment) -> Result<Option<Message>> {
        let conversation_id = self.require_active()?.id.clone();
        self.send(OutgoingDraft::with_attachment(conversation_id, attachment))
            .await
    }

    /// Ownership check against the open conversation; no network involved
    fn authorized(&mut self, id: &MessageId) -> Result<(ConversationId, Message)> {
        let active = self.require_active()?;
        let message = active.sends.authorize(&active.store, id)?;
        Ok((active.id.clone(), message.clone()))
    }

    pub async fn edit_message(&mut self, id: &MessageId, content: &str) -> Result<()> {
        let (conversation_id, message) = self.authorized(id)?;
        if message.is_revoked() {
            return Err(SyncError::validation("message_id", "Message was revoked"));
        }
        if message.kind != MessageKind::Text {
            return Err(SyncError::validation("message_id", "Only text messages can be edited"));
        }
        if content.trim().is_empty() {
            return Err(SyncError::validation("content", "Message cannot be empty"));
        }

        self.backend.update_message(id, content).await?;

        if let Some(active) = self.active.as_mut() {
            active.store.mutate(id, &MessagePatch::edit(content));
            if let Some(updated) = active.store.get(id) {
                self.conversations.refresh_preview(updated);
            }
        }
        self.emit_after_commit(OutboundEvent::UpdateMessage {
            conversation_id,
            message_id: id.clone(),
            content: content.to_string(),
        });
        Ok(())
    }

    pub async fn revoke_message(&mut self, id: &MessageId) -> Result<()> {
        let (conversation_id, message) = self.authorized(id)?;
        if message.is_revoked() {
            return Ok(());
        }

        self.backend
            .revoke_message(id, &conversation_id, self.local_user_id)
            .await?;

        if let Some(active) = self.active.as_mut() {
            active.store.mutate(id, &MessagePatch::revoke());
        }
        self.conversations.apply_revoked(&conversation_id, id);
        self.emit_after_commit(OutboundEvent::RevokeMessage {
            conversation_id,
            message_id: id.clone(),
            user_id: self.local_user_id,
        });
        Ok(())
    }

    pub async fn delete_message(&mut self, id: &MessageId) -> Result<()> {
        let (conversation_id, _) = self.authorized(id)?;

        self.backend
            .delete_message(id, &conversation_id, self.local_user_id)
            .await?;

        if let Some(active) = self.active.as_mut() {
            active.store.remove(id);
        }
        self.conversations.apply_deleted(&conversation_id, id);
        self.emit_after_commit(OutboundEvent::DeleteMessage {
            conversation_id,
            message_id: id.clone(),
            user_id: self.local_user_id,
        });
        Ok(())
    }

    /// The REST call already succeeded; a lost push event is only logged
    fn emit_after_commit(&self, event: OutboundEvent) {
        let name = event.name();
        if let Err(e) = self.channel.emit(event) {
            tracing::warn!("[SYNC] '{}' not delivered: {}", name, e);
        }
    }

    /// Tell the room the local user is typing
    pub fn notify_typing(&mut self) -> Result<()> {
        let conversation_id = self.require_active()?.id.clone();
        self.channel.emit(OutboundEvent::Typing { conversation_id })
    }

    /// Report a message as seen by the local user
    pub fn mark_seen(&mut self, id: &MessageId) -> Result<()> {
        let local_user_id = self.local_user_id;
        let active = self.require_active()?;
        if !active.store.contains(id) {
            return Err(SyncError::validation("message_id", format!("Unknown message {}", id)));
        }
        active.store.mark_seen(id, local_user_id);
        let event = OutboundEvent::MessageSeen {
            conversation_id: active.id.clone(),
            message_id: id.clone(),
        };
        self.channel.emit(event)
    }

    pub fn handle_update(&mut self, update: ChannelUpdate) -> RouteOutcome {
        self.handle_update_at(update, Instant::now())
    }

    /// Apply one push-channel update as of `now`
    pub fn handle_update_at(&mut self, update: ChannelUpdate, now: Instant) -> RouteOutcome {
        match update {
            ChannelUpdate::Status(status) => {
                self.on_status(status);
                RouteOutcome::Ignored
            }
            ChannelUpdate::Event(event) => self.on_event(event, now),
        }
    }

    fn on_status(&mut self, status: ConnectionStatus) {
        tracing::debug!("[SYNC] Channel status {:?}", status);
        if status == ConnectionStatus::Connected {
            if self.ever_connected {
                if let Err(e) = self.router.resubscribe(&self.channel) {
                    tracing::warn!("[SYNC] Rejoin not delivered: {}", e);
                }
            }
            self.ever_connected = true;
        }
        self.connection = status;
    }

    fn on_event(&mut self, event: InboundEvent, now: Instant) -> RouteOutcome {
        // The conversation list follows every conversation
        match &event {
            InboundEvent::NewMessage(raw) => {
                let message = self.normalizer.normalize(raw);
                self.conversations.apply_new_message(&message);
            }
            InboundEvent::MessageRevoked {
                conversation_id: Some(conversation_id),
                message_id,
            } => {
                self.conversations.apply_revoked(conversation_id, message_id);
            }
            InboundEvent::MessageDeleted {
                conversation_id: Some(conversation_id),
                message_id,
            } => {
                self.conversations.apply_deleted(conversation_id, message_id);
            }
            _ => {}
        }

        let mut detached = MergeStore::new();
        let store = match self.active.as_mut() {
            Some(active) => &mut active.store,
            None => &mut detached,
        };
        self.router
            .route(event, store, &self.normalizer, &self.channel, now)
    }

    /// Names of a conversation's participants. Users that no longer exist
    /// resolve to a placeholder.
    pub async fn resolve_participants(&self, conversation_id: &ConversationId) -> Result<Vec<UserDetail>> {
        let ids = self.backend.fetch_participants(conversation_id).await?;
        let lookups = ids.iter().map(|id| self.backend.fetch_user_detail(*id));
        let results = join_all(lookups).await;

        ids.into_iter()
            .zip(results)
            .map(|(user_id, result)| match result {
                Ok(detail) => Ok(detail),
                Err(SyncError::NotFound(_)) => {
                    tracing::debug!("[SYNC] User {} not found, using placeholder", user_id);
                    Ok(UserDetail {
                        user_id,
                        display_name: UNKNOWN_USER.to_string(),
                        avatar: None,
                    })
                }
                Err(e) => Err(e),
            })
            .collect()
    }
}
