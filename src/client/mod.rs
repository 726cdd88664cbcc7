//! Client Module
//!
//! Network plumbing: configuration, the REST client and the push channel.

pub mod config;
pub mod api;
pub mod socket;

pub use api::{MessageBackend, RestClient, UserDetail};
pub use config::Config;
pub use socket::{ChannelUpdate, ConnectionStatus, PushChannel, PushConnection};
