//! Subprocess orchestration for the two assistant CLIs.
//!
//! - [`claude::ClaudeCli`]: resumable assistant. The first call per sender
//!   asks for a JSON envelope and records the returned session id; later calls
//!   resume that session and read plain text.
//! - [`cursor::CursorAgent`]: agentic tool. A chat is created lazily per
//!   sender and resumed on every call; output is opaque text.
//! - [`stream`]: incremental decoding of the resumable assistant's
//!   `stream-json` event lines.
//!
//! Every failure is flattened into a user-facing reply string; nothing here
//! returns an error to the router.

pub mod claude;
pub mod cursor;
pub mod error;
pub mod process;
pub mod stream;

pub use {
    claude::{ClaudeCli, OutputFormat, SessionToken},
    cursor::CursorAgent,
    error::{Error, Result},
    stream::{ReplyStream, StreamAccumulator, StreamEvent},
};

/// Reply when a backend misses its deadline.
pub const MSG_TIMEOUT: &str = "Error: Request timed out — try again";

/// Reply when the agent backend is asked for but has no executable configured.
pub const MSG_NO_AGENT: &str = "Error: Cursor CLI path not configured";

/// Reply when the agent backend exits cleanly without printing anything.
pub const MSG_NO_AGENT_RESPONSE: &str = "Error: No response from Cursor Agent";
