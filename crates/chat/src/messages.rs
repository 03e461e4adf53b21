//! Fixed user-facing replies.

pub const MSG_NEW_SESSION: &str = "Session cleared — starting fresh.";

pub const MSG_HISTORY_EMPTY: &str = "No history yet — send a message first.";

/// Exchanges shown by `/history`; two log entries each.
pub const HISTORY_MAX_EXCHANGES: usize = 10;

pub const MSG_MODEL_USAGE: &str = "Usage:
  /model claude <model-id>  — switch Claude model
  /model cursor <name>      — switch Cursor model

Examples:
  /model claude claude-opus-4-6
  /model cursor sonnet 4.5";

pub const MSG_HELP: &str = "clirelay — your dev tools on Telegram

Commands:
  /help                    — show this message
  /status                  — current config at a glance
  /model claude <alias>    — switch Claude model
  /model cursor <name>     — switch Cursor model
  /new                     — start a fresh Claude session
  /history                 — show last exchanges

Media:
  Voice note               — transcribed then routed automatically
  Photo                    — analyzed by Claude Vision then routed
  Photo + caption          — caption becomes the analysis question

Model aliases (CLAUDE_MODEL_ALIASES):
  opus   → claude-opus-4-6
  sonnet → claude-sonnet-4-5-20250929
  haiku  → claude-haiku-4-5-20251001

Routing:
  @claude / claude: / hey claude → Claude CLI
  everything else                → Cursor Agent
";

pub fn model_set(model: &str) -> String {
    format!("Claude model set to: {model}")
}

pub fn status(model: &str, voice: &str, cursor: &str) -> String {
    format!("Status\n  Claude model : {model}\n  Voice        : {voice}\n  Cursor       : {cursor}\n")
}
