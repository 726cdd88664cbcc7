//! Shared Module
//!
//! Types shared by the REST client, the push channel and the
//! synchronization engine. Everything here is plain data: serializable,
//! platform-agnostic, and free of I/O.

/// Messaging data structures
pub mod messaging;

/// Push channel events
pub mod event;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
pub use error::{Result, SyncError};
pub use event::{InboundEvent, OutboundEvent};
pub use messaging::{ConversationId, Message, MessageId, MessageKind, MessageStatus};
