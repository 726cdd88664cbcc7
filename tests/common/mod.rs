//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - An in-memory `MessageBackend` that records every call
//! - A `PushChannel` that records every emitted event
//! - Raw payload builders
//! - Custom assertion macros

pub mod assertions;
pub mod fakes;
pub mod fixtures;

// Re-export commonly used utilities
pub use fakes::*;
pub use fixtures::*;
