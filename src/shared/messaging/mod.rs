//! Messaging Module
//!
//! Data structures for the chat thread and the conversation list:
//!
//! - `Message` - Canonical message record
//! - `RawMessage` / `RawPage` - Backend payloads before normalization
//! - `Conversation` - Conversation summary for the list view
//!
//! # Usage
//!
//! ```rust
//! use webchat_sync::shared::messaging::{Message, MessageId, ConversationId};
//! ```

pub mod conversation;
pub mod message;
pub mod raw;

// Re-export all types
pub use conversation::{Conversation, LastMessage};
pub use message::{
    Attachment, ConversationId, Message, MessageId, MessageKind, MessagePatch, MessageStatus,
    OutgoingDraft,
};
pub use raw::{RawConversation, RawMessage, RawPage, RawRecord};
