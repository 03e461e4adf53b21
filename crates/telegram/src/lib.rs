//! Telegram transport for clirelay.
//!
//! Long-polls the Bot API with teloxide, gates every update on the allowed
//! chat, turns voice notes and photos into text, and delivers replies either
//! as a single message or edited in place while the backend streams.

pub mod bot;
pub mod error;
pub mod handlers;
pub mod outbound;
pub mod state;

pub use {
    bot::{build_bot, start_polling},
    error::{Error, Result},
    state::RelayState,
};
