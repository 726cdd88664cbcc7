//! # Pagination Cursor Tracker
//!
//! Tracks the backend's opaque "last key" for reverse-chronological history
//! loads of one conversation.
//!
//! - The first fetch carries no cursor and returns the newest page.
//! - A page answered without a cursor exhausts the history for the
//!   tracker's lifetime.
//! - At most one fetch is in flight; a request made meanwhile is dropped,
//!   not queued.
//! - Every fetch is identified by a [`FetchTicket`]; a response presented
//!   with a ticket that is no longer current is discarded.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::shared::messaging::{ConversationId, Message, RawPage};
use crate::sync::normalizer::Normalizer;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Handle for one in-flight history fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    conversation_id: ConversationId,
    cursor: Option<String>,
    generation: u64,
}

impl FetchTicket {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Cursor to send; `None` asks for the newest page
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }
}

/// Cursor state for one conversation
#[derive(Debug)]
pub struct CursorTracker {
    conversation_id: ConversationId,
    cursor: Option<String>,
    has_more: bool,
    in_flight: Option<u64>,
}

impl CursorTracker {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            cursor: None,
            has_more: true,
            in_flight: None,
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Start a fetch, or `None` when one is pending or history is exhausted
    pub fn begin(&mut self) -> Option<FetchTicket> {
        if self.in_flight.is_some() {
            tracing::debug!("[SYNC] History fetch already pending for {}, dropping request", self.conversation_id);
            return None;
        }
        if !self.has_more {
            tracing::debug!("[SYNC] History of {} exhausted", self.conversation_id);
            return None;
        }
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        self.in_flight = Some(generation);
        Some(FetchTicket {
            conversation_id: self.conversation_id.clone(),
            cursor: self.cursor.clone(),
            generation,
        })
    }

    fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.conversation_id == self.conversation_id && self.in_flight == Some(ticket.generation)
    }

    /// Accept a page for `ticket`. Returns the page's messages normalized
    /// and in ascending order, or `None` for a stale ticket.
    pub fn complete(
        &mut self,
        ticket: &FetchTicket,
        page: RawPage,
        normalizer: &Normalizer,
    ) -> Option<Vec<Message>> {
        if !self.is_current(ticket) {
            tracing::debug!("[SYNC] Discarding stale history page for {}", ticket.conversation_id);
            return None;
        }
        self.in_flight = None;
        match page.next_cursor {
            Some(next) => self.cursor = Some(next),
            None => {
                self.cursor = None;
                self.has_more = false;
            }
        }
        let messages = page
            .messages
            .iter()
            .rev()
            .map(|raw| normalizer.normalize_in(raw, Some(&self.conversation_id)))
            .collect();
        Some(messages)
    }

    /// Release the in-flight slot after a failed fetch; the cursor is kept
    /// so the next gesture retries the same page.
    pub fn abort(&mut self, ticket: &FetchTicket) {
        if self.is_current(ticket) {
            self.in_flight = None;
        }
    }
}
