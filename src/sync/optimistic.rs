//! # Optimistic Send Tracker
//!
//! Two-phase send protocol for outgoing messages.
//!
//! 1. [`SendTracker::begin_send`] validates the draft, appends a provisional
//!    entry under a `temp-<millis>` id and returns immediately.
//! 2. The network call runs elsewhere; its outcome is reported through
//!    [`SendTracker::confirm_send`] (server id, timestamp and attachment
//!    fields replace the provisional ones in place) or
//!    [`SendTracker::fail_send`] (the provisional entry is removed).
//!
//! Failed sends are never retried automatically. The tracker also guards
//! edit, revoke and delete: only the local user's own messages qualify.
//!
//! ## Usage
//!
//! ```rust
//! use webchat_sync::shared::messaging::{ConversationId, OutgoingDraft};
//! use webchat_sync::sync::{MergeStore, SendTracker};
//!
//! let mut store = MergeStore::new();
//! let mut tracker = SendTracker::new(7);
//! let draft = OutgoingDraft::text(ConversationId::new("c1"), "hi");
//! let temp_id = tracker.begin_send(&mut store, draft).unwrap();
//! assert!(store.get(&temp_id).unwrap().is_optimistic);
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::shared::error::{Result, SyncError};
use crate::shared::messaging::{
    Message, MessageId, MessageKind, MessageStatus, OutgoingDraft,
};
use crate::sync::store::MergeStore;

/// A send awaiting its network outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub temp_id: MessageId,
    pub draft: OutgoingDraft,
    pub started_at: DateTime<Utc>,
}

/// Optimistic send bookkeeping for the local user
#[derive(Debug)]
pub struct SendTracker {
    local_user_id: i64,
    pending: HashMap<MessageId, PendingSend>,
}

impl SendTracker {
    pub fn new(local_user_id: i64) -> Self {
        Self {
            local_user_id,
            pending: HashMap::new(),
        }
    }

    pub fn local_user_id(&self) -> i64 {
        self.local_user_id
    }

    pub fn is_pending(&self, temp_id: &MessageId) -> bool {
        self.pending.contains_key(temp_id)
    }

    pub fn pending(&self, temp_id: &MessageId) -> Option<&PendingSend> {
        self.pending.get(temp_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Insert the provisional entry and hand back its temporary id
    pub fn begin_send(&mut self, store: &mut MergeStore, draft: OutgoingDraft) -> Result<MessageId> {
        draft.validate()?;

        let now = Utc::now();
        let temp_id = self.fresh_temp_id(store, now.timestamp_millis());
        let kind = draft.kind();
        let attachment_name = match (&draft.attachment, kind) {
            (Some(attachment), MessageKind::File) => Some(attachment.file_name.clone()),
            _ => None,
        };

        let message = Message {
            id: temp_id.clone(),
            conversation_id: draft.conversation_id.clone(),
            sender_id: self.local_user_id,
            kind,
            content: draft.content.clone(),
            attachment_url: None,
            attachment_name,
            timestamp: now,
            status: MessageStatus::Sent,
            is_optimistic: true,
            seen_by: Default::default(),
        };
        store.append_live(message);
        tracing::debug!("[SYNC] Optimistic send {} in {}", temp_id, draft.conversation_id);

        self.pending.insert(
            temp_id.clone(),
            PendingSend {
                temp_id: temp_id.clone(),
                draft,
                started_at: now,
            },
        );
        Ok(temp_id)
    }

    fn fresh_temp_id(&self, store: &MergeStore, millis: i64) -> MessageId {
        let base = MessageId::temporary(millis);
        let taken = |id: &MessageId| self.pending.contains_key(id) || store.contains(id);
        if !taken(&base) {
            return base;
        }
        (1..)
            .map(|n| MessageId::new(format!("{}-{}", base, n)))
            .find(|id| !taken(id))
            .unwrap_or(base)
    }

    /// Replace the provisional entry with the server's id, timestamp and
    /// attachment fields. Returns the confirmed message, or `None` when the
    /// temp id is unknown (already confirmed, failed, or discarded).
    pub fn confirm_send(
        &mut self,
        store: &mut MergeStore,
        temp_id: &MessageId,
        server: Message,
    ) -> Option<Message> {
        let pending = self.pending.remove(temp_id)?;

        let mut confirmed = match store.get(temp_id) {
            Some(local) => local.clone(),
            None => {
                tracing::debug!("[SYNC] Confirmed send {} no longer displayed", temp_id);
                return None;
            }
        };
        confirmed.id = server.id;
        confirmed.timestamp = server.timestamp;
        if server.attachment_url.is_some() {
            confirmed.attachment_url = server.attachment_url;
        }
        if confirmed.content.is_empty() && !server.content.is_empty() {
            confirmed.content = server.content;
        }
        // The name the user picked beats whatever the server derived from its URL
        if confirmed.kind == MessageKind::File {
            confirmed.attachment_name = pending
                .draft
                .attachment
                .map(|a| a.file_name)
                .or(confirmed.attachment_name)
                .or(server.attachment_name);
        }
        confirmed.is_optimistic = false;

        tracing::info!("[SYNC] Send {} confirmed as {}", temp_id, confirmed.id);
        store.rekey(temp_id, confirmed.clone());
        Some(confirmed)
    }

    /// Roll back a failed send. The draft is returned so the caller can
    /// offer it for resubmission.
    pub fn fail_send(&mut self, store: &mut MergeStore, temp_id: &MessageId) -> Option<PendingSend> {
        let pending = self.pending.remove(temp_id)?;
        store.remove(temp_id);
        tracing::warn!("[SYNC] Send {} failed, rolled back", temp_id);
        Some(pending)
    }

    /// Look up a message the local user may edit, revoke or delete
    pub fn authorize<'a>(&self, store: &'a MergeStore, id: &MessageId) -> Result<&'a Message> {
        if id.is_empty() {
            return Err(SyncError::validation("message_id", "Missing message id"));
        }
        let message = store
            .get(id)
            .ok_or_else(|| SyncError::validation("message_id", format!("Unknown message {}", id)))?;
        if message.sender_id != self.local_user_id {
            return Err(SyncError::forbidden(id.as_str()));
        }
        if message.is_optimistic || id.is_temporary() {
            return Err(SyncError::validation(
                "message_id",
                "Message has not been delivered yet",
            ));
        }
        Ok(message)
    }
}
