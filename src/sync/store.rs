//! # Deduplicating Merge Store
//!
//! Ordered collection of the open conversation's messages, keyed by id.
//!
//! Entries sit at integer positions: history pages take positions below the
//! current front, live messages take positions past the current back. An
//! entry never changes position once placed, so status and content
//! mutations cannot reorder the thread. An id index gives direct lookup.
//!
//! Every operation is idempotent; replaying a page or an event leaves the
//! store unchanged.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::shared::messaging::{Message, MessageId, MessagePatch, MessageStatus};

/// What `append_live` did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveOutcome {
    Appended,
    /// Same id was present; replaced in place
    Replaced,
    /// Message arrived already deleted; any local copy was dropped
    Removed,
}

#[derive(Debug, Default, Clone)]
pub struct MergeStore {
    entries: BTreeMap<i64, Message>,
    index: HashMap<MessageId, i64>,
}

impl MergeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.index.get(id).and_then(|pos| self.entries.get(pos))
    }

    /// Messages in display order
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.values()
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.iter().map(|m| m.id.clone()).collect()
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last_key_value().map(|(_, m)| m)
    }

    /// Prepend the messages of a history page (ascending order) whose ids
    /// are not present yet. Returns how many were inserted.
    pub fn insert_history(&mut self, messages: Vec<Message>) -> usize {
        let mut seen = HashSet::new();
        let fresh: Vec<Message> = messages
            .into_iter()
            .filter(|m| m.status != MessageStatus::Deleted)
            .filter(|m| !self.index.contains_key(&m.id))
            .filter(|m| seen.insert(m.id.clone()))
            .collect();
        if fresh.is_empty() {
            return 0;
        }

        let front = self.entries.first_key_value().map(|(pos, _)| *pos).unwrap_or(0);
        let start = front - fresh.len() as i64;
        let inserted = fresh.len();
        for (offset, message) in fresh.into_iter().enumerate() {
            let pos = start + offset as i64;
            self.index.insert(message.id.clone(), pos);
            self.entries.insert(pos, message);
        }
        tracing::debug!("[SYNC] Prepended {} history messages", inserted);
        inserted
    }

    /// Replace in place when the id is known, otherwise append
    pub fn append_live(&mut self, message: Message) -> LiveOutcome {
        if message.status == MessageStatus::Deleted {
            self.remove(&message.id);
            return LiveOutcome::Removed;
        }
        if let Some(pos) = self.index.get(&message.id).copied() {
            self.entries.insert(pos, message);
            return LiveOutcome::Replaced;
        }
        let pos = self
            .entries
            .last_key_value()
            .map(|(pos, _)| pos + 1)
            .unwrap_or(0);
        tracing::debug!("[SYNC] Appending message {}", message.id);
        self.index.insert(message.id.clone(), pos);
        self.entries.insert(pos, message);
        LiveOutcome::Appended
    }

    /// Apply a partial update; a `Deleted` status removes the entry.
    /// Returns false when the id is unknown.
    pub fn mutate(&mut self, id: &MessageId, patch: &MessagePatch) -> bool {
        if patch.status == Some(MessageStatus::Deleted) {
            return self.remove(id).is_some();
        }
        match self.index.get(id).and_then(|pos| self.entries.get_mut(pos)) {
            Some(message) => {
                message.apply_patch(patch);
                tracing::debug!("[SYNC] Mutated message {}", id);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let pos = self.index.remove(id)?;
        tracing::debug!("[SYNC] Removed message {}", id);
        self.entries.remove(&pos)
    }

    /// Record that `user_id` has seen the message
    pub fn mark_seen(&mut self, id: &MessageId, user_id: i64) -> bool {
        match self.index.get(id).and_then(|pos| self.entries.get_mut(pos)) {
            Some(message) => message.seen_by.insert(user_id),
            None => false,
        }
    }

    /// Swap the entry stored under `old` for `message`, which may carry a
    /// different id. If `message.id` is already present elsewhere (its echo
    /// arrived first), that entry is updated and `old` is dropped instead.
    pub fn rekey(&mut self, old: &MessageId, message: Message) -> bool {
        let Some(old_pos) = self.index.get(old).copied() else {
            return false;
        };
        if message.id != *old {
            if let Some(existing_pos) = self.index.get(&message.id).copied() {
                self.index.remove(old);
                self.entries.remove(&old_pos);
                self.entries.insert(existing_pos, message);
                return true;
            }
            self.index.remove(old);
            self.index.insert(message.id.clone(), old_pos);
        }
        self.entries.insert(old_pos, message);
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}
