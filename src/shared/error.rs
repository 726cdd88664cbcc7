//! Shared Error Types
//!
//! This module defines the error taxonomy used by every part of the
//! synchronization engine, from the REST client down to the merge store.
//!
//! # Error Categories
//!
//! - `Validation` - Missing local input, caught before any network call
//! - `Forbidden` - Editing or removing another user's message
//! - `Network` / `Server` - Failed REST calls or rejected push emits
//! - `NotFound` - A remote resource that no longer exists
//! - `Serialization` / `Protocol` - Malformed payloads or frames
//! - `Storage` - Local attachment-name cache failures
//!
//! # Usage
//!
//! ```rust
//! use webchat_sync::shared::error::SyncError;
//!
//! let error = SyncError::validation("content", "Message cannot be empty");
//! assert!(error.is_user_blocking());
//! ```
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised by the synchronization engine and its collaborators
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Required local input is missing or empty
    #[error("Validation error in field '{field}': {message}")]
    Validation {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },

    /// The local user does not own the message
    #[error("Forbidden: message {message_id} belongs to another user")]
    Forbidden {
        /// Message the action targeted
        message_id: String,
    },

    /// Transport-level failure (connection refused, timeout, socket closed)
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status
    #[error("Server error {status}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Body or reason returned by the server
        message: String,
    },

    /// Remote resource does not exist (or is no longer reachable)
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Malformed push-channel frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Local cache database failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// The push channel is not running
    #[error("Push channel is not connected")]
    NotConnected,
}

impl SyncError {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new forbidden error for a message id
    pub fn forbidden(message_id: impl Into<String>) -> Self {
        Self::Forbidden {
            message_id: message_id.into(),
        }
    }

    /// Create a new network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Create a new server error
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Create a new protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Blocking errors stop the user's action outright; the rest are shown
    /// as transient notifications.
    pub fn is_user_blocking(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Forbidden { .. })
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 404 => Self::NotFound(err.to_string()),
            Some(status) => Self::server(status.as_u16(), err.to_string()),
            None if err.is_decode() => Self::Serialization(err.to_string()),
            None => Self::network(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::network(format!("websocket: {}", err))
    }
}
