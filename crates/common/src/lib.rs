//! Shared message types, identity normalization, and error helpers used across all clirelay crates.

pub mod error;
pub mod identity;
pub mod types;

pub use {error::FromMessage, identity::normalize_sender, types::ChatMessage};
