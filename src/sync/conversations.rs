//! Conversation list view model.
//!
//! Keeps the user's conversations ordered by last activity, newest first,
//! and patches last-message previews as push events arrive for any
//! conversation, active or not.

use chrono::Utc;

use crate::shared::messaging::{
    Conversation, ConversationId, LastMessage, Message, MessageId, MessageStatus, RawConversation,
};

const REVOKED_PREVIEW: &str = "Message revoked";
const DELETED_PREVIEW: &str = "Message deleted";

#[derive(Debug, Clone, Default)]
pub struct ConversationList {
    conversations: Vec<Conversation>,
}

impl ConversationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole list with a fresh fetch. Entries without an id are
    /// skipped.
    pub fn replace_all(&mut self, raw: &[RawConversation]) {
        self.conversations = raw.iter().filter_map(Conversation::from_raw).collect();
        self.sort();
        tracing::debug!("[SYNC] Conversation list holds {} entries", self.conversations.len());
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.iter()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    fn get_mut(&mut self, id: &ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| &c.id == id)
    }

    /// New or confirmed message: it becomes the conversation's preview
    pub fn apply_new_message(&mut self, message: &Message) -> bool {
        let Some(conversation) = self.get_mut(&message.conversation_id) else {
            return false;
        };
        conversation.last_message = Some(LastMessage::from_message(message));
        self.sort();
        true
    }

    /// Re-render the preview of an edited message if it is the one shown
    pub fn refresh_preview(&mut self, message: &Message) -> bool {
        let Some(conversation) = self.get_mut(&message.conversation_id) else {
            return false;
        };
        match conversation.last_message.as_mut() {
            Some(last) if last.message_id.as_ref() == Some(&message.id) => {
                last.content = LastMessage::from_message(message).content;
                true
            }
            _ => false,
        }
    }

    pub fn apply_revoked(&mut self, conversation_id: &ConversationId, message_id: &MessageId) -> bool {
        self.replace_preview(conversation_id, message_id, REVOKED_PREVIEW, MessageStatus::Revoked)
    }

    pub fn apply_deleted(&mut self, conversation_id: &ConversationId, message_id: &MessageId) -> bool {
        self.replace_preview(conversation_id, message_id, DELETED_PREVIEW, MessageStatus::Deleted)
    }

    /// Only touches the preview when it shows the affected message
    fn replace_preview(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        text: &str,
        status: MessageStatus,
    ) -> bool {
        let Some(conversation) = self.get_mut(conversation_id) else {
            return false;
        };
        let Some(last) = conversation.last_message.as_mut() else {
            return false;
        };
        if last.message_id.as_ref() != Some(message_id) {
            return false;
        }
        last.content = text.to_string();
        last.status = status;
        last.timestamp = Some(Utc::now());
        self.sort();
        true
    }

    /// Newest activity first; stable for ties, no activity last
    fn sort(&mut self) {
        self.conversations
            .sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
    }
}
