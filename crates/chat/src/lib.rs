//! Transport-agnostic message handling: the access gate and the router that
//! ties routing, backends and the continuity stores together.

pub mod gate;
pub mod messages;
pub mod router;

pub use {
    gate::{MessageAction, MessageGate},
    router::MessageRouter,
};
