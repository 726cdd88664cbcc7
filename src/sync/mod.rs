//! Synchronization Engine
//!
//! Reconciles three unordered sources into one consistent view per
//! conversation: paginated history, live push events and the local user's
//! optimistic sends.

pub mod normalizer;
pub mod cursor;
pub mod store;
pub mod optimistic;
pub mod router;
pub mod conversations;
pub mod session;

pub use conversations::ConversationList;
pub use cursor::{CursorTracker, FetchTicket};
pub use normalizer::{AttachmentNames, Normalizer};
pub use optimistic::{PendingSend, SendTracker};
pub use router::{LiveEventRouter, PresenceMap, RouteOutcome, Subscription, TypingIndicator};
pub use session::ChatSession;
pub use store::{LiveOutcome, MergeStore};
