//! # Live Event Router
//!
//! Routes push-channel events into the open conversation's state.
//!
//! The router holds the subscription state machine
//! (`Unsubscribed -> Subscribed(conversation)`) and the ephemeral view
//! state that never enters the merge store: the typing indicator and the
//! presence map. Every message event is checked against the active
//! conversation before the store is touched.
//!
//! Besides the active room, the router keeps the rooms of every listed
//! conversation joined so the conversation list hears about all of them.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use crate::client::socket::PushChannel;
use crate::shared::error::Result;
use crate::shared::event::{InboundEvent, OutboundEvent};
use crate::shared::messaging::{ConversationId, MessageId, MessagePatch};
use crate::sync::normalizer::Normalizer;
use crate::sync::store::{LiveOutcome, MergeStore};

/// Room subscription state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Subscription {
    #[default]
    Unsubscribed,
    Subscribed(ConversationId),
}

/// What an inbound event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Not for the active conversation, unknown id, or unhandled event
    Ignored,
    Appended(MessageId),
    Replaced(MessageId),
    Updated(MessageId),
    Revoked(MessageId),
    Removed(MessageId),
    Seen(MessageId),
    Typing(Option<i64>),
    Presence { user_id: i64, online: bool },
}

impl RouteOutcome {
    /// Whether the visible thread changed
    pub fn changed_store(&self) -> bool {
        matches!(
            self,
            Self::Appended(_)
                | Self::Replaced(_)
                | Self::Updated(_)
                | Self::Revoked(_)
                | Self::Removed(_)
                | Self::Seen(_)
        )
    }
}

/// "Someone is typing" state that clears itself after a timeout
#[derive(Debug, Clone)]
pub struct TypingIndicator {
    timeout: Duration,
    last: Option<(Option<i64>, Instant)>,
}

impl TypingIndicator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, last: None }
    }

    /// Restart the timer for `user_id`
    pub fn signal(&mut self, user_id: Option<i64>, now: Instant) {
        self.last = Some((user_id, now));
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.last
            .map(|(_, at)| now.saturating_duration_since(at) < self.timeout)
            .unwrap_or(false)
    }

    /// User currently shown as typing, if the indicator is still live
    pub fn typing_user(&self, now: Instant) -> Option<i64> {
        match self.last {
            Some((user, _)) if self.is_active(now) => user,
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.last = None;
    }
}

/// Online state by user id
#[derive(Debug, Clone, Default)]
pub struct PresenceMap {
    online: HashMap<i64, bool>,
}

impl PresenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, user_id: i64, online: bool) {
        self.online.insert(user_id, online);
    }

    /// `None` when nothing was heard about the user yet
    pub fn is_online(&self, user_id: i64) -> Option<bool> {
        self.online.get(&user_id).copied()
    }

    pub fn online_users(&self) -> Vec<i64> {
        let mut users: Vec<i64> = self
            .online
            .iter()
            .filter(|(_, online)| **online)
            .map(|(user, _)| *user)
            .collect();
        users.sort_unstable();
        users
    }

    pub fn clear(&mut self) {
        self.online.clear();
    }
}

/// Subscription state machine plus event dispatch
#[derive(Debug)]
pub struct LiveEventRouter {
    subscription: Subscription,
    watched: BTreeSet<ConversationId>,
    typing: TypingIndicator,
    presence: PresenceMap,
}

impl LiveEventRouter {
    pub fn new(typing_timeout: Duration) -> Self {
        Self {
            subscription: Subscription::Unsubscribed,
            watched: BTreeSet::new(),
            typing: TypingIndicator::new(typing_timeout),
            presence: PresenceMap::new(),
        }
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn active_conversation(&self) -> Option<&ConversationId> {
        match &self.subscription {
            Subscription::Subscribed(id) => Some(id),
            Subscription::Unsubscribed => None,
        }
    }

    /// Rooms joined for the conversation list
    pub fn watched(&self) -> impl Iterator<Item = &ConversationId> {
        self.watched.iter()
    }

    pub fn typing(&self) -> &TypingIndicator {
        &self.typing
    }

    pub fn presence(&self) -> &PresenceMap {
        &self.presence
    }

    /// Leave the current room (if any) and join `conversation_id`.
    ///
    /// The state moves even when an emit fails; the room is joined again
    /// by [`LiveEventRouter::resubscribe`] once the channel is back.
    pub fn switch_to(&mut self, conversation_id: ConversationId, channel: &dyn PushChannel) -> Result<()> {
        if self.active_conversation() == Some(&conversation_id) {
            return Ok(());
        }
        let leave_result = self.unsubscribe(channel);

        tracing::info!("[SYNC] Subscribing to conversation {}", conversation_id);
        self.subscription = Subscription::Subscribed(conversation_id.clone());
        channel.emit(OutboundEvent::JoinConversation { conversation_id })?;
        leave_result
    }

    /// Drop the active room. A room the conversation list still watches
    /// stays joined.
    pub fn unsubscribe(&mut self, channel: &dyn PushChannel) -> Result<()> {
        self.typing.clear();
        self.presence.clear();
        match std::mem::take(&mut self.subscription) {
            Subscription::Subscribed(conversation_id) if self.watched.contains(&conversation_id) => {
                tracing::debug!("[SYNC] Keeping listed room {} joined", conversation_id);
                Ok(())
            }
            Subscription::Subscribed(conversation_id) => {
                tracing::info!("[SYNC] Leaving conversation {}", conversation_id);
                channel.emit(OutboundEvent::LeaveConversation { conversation_id })
            }
            Subscription::Unsubscribed => Ok(()),
        }
    }

    /// Keep exactly the rooms of `conversations` joined for the list.
    ///
    /// Newly listed rooms are joined; rooms that dropped off the list are
    /// left unless they are the active one. Every emit is attempted; the
    /// first failure is returned.
    pub fn watch_all<I>(&mut self, conversations: I, channel: &dyn PushChannel) -> Result<()>
    where
        I: IntoIterator<Item = ConversationId>,
    {
        let listed: BTreeSet<ConversationId> = conversations
            .into_iter()
            .filter(|id| !id.is_empty())
            .collect();
        let active = self.active_conversation().cloned();
        let mut result = Ok(());

        for conversation_id in self.watched.difference(&listed) {
            if Some(conversation_id) == active.as_ref() {
                continue;
            }
            let left = channel.emit(OutboundEvent::LeaveConversation {
                conversation_id: conversation_id.clone(),
            });
            result = result.and(left);
        }
        for conversation_id in listed.difference(&self.watched) {
            if Some(conversation_id) == active.as_ref() {
                continue;
            }
            let joined = channel.emit(OutboundEvent::JoinConversation {
                conversation_id: conversation_id.clone(),
            });
            result = result.and(joined);
        }
        tracing::info!("[SYNC] Watching {} conversation rooms", listed.len());
        self.watched = listed;
        result
    }

    /// Join every listed room and the active room again after the
    /// channel reconnected
    pub fn resubscribe(&self, channel: &dyn PushChannel) -> Result<()> {
        let rooms: BTreeSet<&ConversationId> =
            self.watched.iter().chain(self.active_conversation()).collect();
        tracing::info!("[SYNC] Rejoining {} conversation rooms", rooms.len());

        let mut result = Ok(());
        for conversation_id in rooms {
            let joined = channel.emit(OutboundEvent::JoinConversation {
                conversation_id: conversation_id.clone(),
            });
            result = result.and(joined);
        }
        result
    }

    /// Apply one inbound event to `store` and the ephemeral state
    pub fn route(
        &mut self,
        event: InboundEvent,
        store: &mut MergeStore,
        normalizer: &Normalizer,
        channel: &dyn PushChannel,
        now: Instant,
    ) -> RouteOutcome {
        // Presence is global, everything else is scoped to the active room
        match &event {
            InboundEvent::UserOnline { user_id } => return self.set_presence(*user_id, true),
            InboundEvent::UserOffline { user_id } => return self.set_presence(*user_id, false),
            _ => {}
        }

        let Some(active) = self.active_conversation().cloned() else {
            tracing::debug!("[SYNC] Dropping '{}' while unsubscribed", event.name());
            return RouteOutcome::Ignored;
        };
        match event.conversation_id() {
            Some(target) if target != active => {
                tracing::debug!("[SYNC] Ignoring '{}' for inactive conversation {}", event.name(), target);
                return RouteOutcome::Ignored;
            }
            None if matches!(event, InboundEvent::NewMessage(_) | InboundEvent::Typing { .. }) => {
                tracing::debug!("[SYNC] Ignoring unscoped '{}'", event.name());
                return RouteOutcome::Ignored;
            }
            _ => {}
        }

        match event {
            InboundEvent::NewMessage(raw) => {
                let message = normalizer.normalize_in(&raw, Some(&active));
                let id = message.id.clone();
                let sender = message.sender_id;
                let outcome = store.append_live(message);
                if self.typing.typing_user(now) == Some(sender) {
                    self.typing.clear();
                }
                match outcome {
                    LiveOutcome::Removed => RouteOutcome::Removed(id),
                    LiveOutcome::Appended | LiveOutcome::Replaced => {
                        let ack = OutboundEvent::MessageReceived {
                            conversation_id: active,
                            message_id: id.clone(),
                        };
                        if let Err(e) = channel.emit(ack) {
                            tracing::warn!("[SYNC] Failed to acknowledge message {}: {}", id, e);
                        }
                        if outcome == LiveOutcome::Appended {
                            RouteOutcome::Appended(id)
                        } else {
                            RouteOutcome::Replaced(id)
                        }
                    }
                }
            }
            InboundEvent::MessageUpdated(raw) => match normalizer.normalize_update(&raw) {
                Some((id, patch)) if store.mutate(&id, &patch) => RouteOutcome::Updated(id),
                _ => RouteOutcome::Ignored,
            },
            InboundEvent::MessageRevoked { message_id, .. } => {
                if store.mutate(&message_id, &MessagePatch::revoke()) {
                    RouteOutcome::Revoked(message_id)
                } else {
                    RouteOutcome::Ignored
                }
            }
            InboundEvent::MessageDeleted { message_id, .. } => match store.remove(&message_id) {
                Some(_) => RouteOutcome::Removed(message_id),
                None => RouteOutcome::Ignored,
            },
            InboundEvent::Typing { user_id, .. } => {
                self.typing.signal(user_id, now);
                RouteOutcome::Typing(user_id)
            }
            InboundEvent::MessageSeen {
                message_id,
                user_id: Some(user_id),
                ..
            } => {
                if store.mark_seen(&message_id, user_id) {
                    RouteOutcome::Seen(message_id)
                } else {
                    RouteOutcome::Ignored
                }
            }
            other => {
                tracing::debug!("[SYNC] Unhandled event '{}'", other.name());
                RouteOutcome::Ignored
            }
        }
    }

    fn set_presence(&mut self, user_id: i64, online: bool) -> RouteOutcome {
        self.presence.set(user_id, online);
        RouteOutcome::Presence { user_id, online }
    }
}
