// Increase recursion limit for complex async operations
#![recursion_limit = "256"]

//! Webchat Sync - Main Library
//!
//! Client-side message stream reconciliation for a web chat backend. The
//! visible thread of a conversation is assembled from three independent,
//! unordered sources and kept consistent while they race:
//!
//! - paginated history fetched over REST, newest page first
//! - live events pushed over a Socket.IO channel
//! - the local user's own sends, shown before the server confirms them
//!
//! # Module Structure
//!
//! - **`shared`** - Plain data shared by every layer
//!   - Canonical `Message`, conversation summaries, raw backend payloads
//!   - Push channel event types
//!   - Error taxonomy and configuration
//!
//! - **`sync`** - The reconciliation engine
//!   - `Normalizer`: raw payload to canonical message, in one place
//!   - `CursorTracker`: opaque "last key" pagination, one fetch in flight
//!   - `MergeStore`: id-keyed, order-preserving, idempotent message store
//!   - `SendTracker`: two-phase optimistic send and ownership checks
//!   - `LiveEventRouter`: room subscription, typing and presence state
//!   - `ChatSession`: orchestration against injected collaborators
//!
//! - **`client`** - Network collaborators
//!   - `RestClient` (reqwest) implementing `MessageBackend`
//!   - `PushConnection` (tokio-tungstenite) implementing `PushChannel`
//!
//! - **`storage`** - SQLite cache of original attachment file names
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use webchat_sync::client::{Config, PushConnection, RestClient};
//! use webchat_sync::sync::ChatSession;
//!
//! # async fn example() -> webchat_sync::shared::Result<()> {
//! let mut config = Config::default();
//! config.set_token(Some("token".to_string()));
//! let (channel, mut updates) = PushConnection::spawn(&config)?;
//! let backend = Arc::new(RestClient::new(config.clone()));
//! let mut session = ChatSession::new(backend, channel, 7, config.app().typing_timeout);
//!
//! session.open("42".into())?;
//! session.load_older().await?;
//! while let Some(update) = updates.recv().await {
//!     session.handle_update(update);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! The engine itself is single-owner: `ChatSession` methods take `&mut self`
//! and never lock. Network work happens in async calls or in the push
//! channel's background task, and every result is applied back through the
//! session, where id-keyed idempotent mutations absorb any ordering.
//!
//! # Error Handling
//!
//! All fallible operations return `shared::Result<T>` with a
//! `shared::SyncError`. Validation and ownership failures are raised before
//! any network call.

/// Shared types and data structures
pub mod shared;

/// Reconciliation engine
pub mod sync;

/// REST and push channel clients
pub mod client;

/// Local attachment-name cache
pub mod storage;
