//! Decide which backend handles an inbound message.
//!
//! A message goes to the stateful backend when it carries one of the
//! configured trigger phrases, or when no agent backend is configured at all.
//! Everything else goes to the agent backend untouched.

pub mod route;

pub use route::{Route, decide, is_tagged, strip_tag};
