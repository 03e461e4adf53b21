use std::{collections::HashMap, path::PathBuf, time::Duration};

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

use crate::error::{ConfigError, Result};

pub const DEFAULT_CLAUDE_CLI: &str = "claude";
pub const DEFAULT_CURSOR_CLI: &str = "agent";
pub const DEFAULT_CLAUDE_TIMEOUT_SECS: u64 = 45;
pub const DEFAULT_CURSOR_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CLAUDE_PATTERNS: &str = "@claude,claude:,hey claude,claude,";
pub const DEFAULT_MODEL_ALIASES: &str = "opus:claude-opus-4-6,sonnet:claude-sonnet-4-5-20250929,haiku:claude-haiku-4-5-20251001";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Shape of `clirelay.toml`. Every field is optional.
///
/// ```toml
/// [telegram]
/// bot_token = "${TELEGRAM_BOT_TOKEN}"
/// allowed_chat_id = "123456789"
///
/// [claude]
/// cli_path = "/usr/local/bin/claude"
/// timeout_secs = 90
/// patterns = ["@claude", "hey claude"]
/// model_aliases = { opus = "claude-opus-4-6" }
///
/// [cursor]
/// cli_path = ""            # disable the agent backend
/// working_dir = "~/src/app"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub telegram: TelegramSection,
    pub claude: ClaudeSection,
    pub cursor: CursorSection,
    pub media: MediaSection,
    pub relay: RelaySection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSection {
    pub bot_token: Option<String>,
    pub allowed_chat_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaudeSection {
    pub cli_path: Option<String>,
    pub timeout_secs: Option<u64>,
    pub patterns: Option<Vec<String>>,
    pub model_aliases: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorSection {
    pub cli_path: Option<String>,
    pub timeout_secs: Option<u64>,
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSection {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    pub state_dir: Option<PathBuf>,
    pub stream_responses: Option<bool>,
    pub log_level: Option<String>,
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub telegram_bot_token: Secret<String>,
    pub allowed_chat_id: String,
    pub claude_cli_path: String,
    /// `None` disables the agent backend.
    pub cursor_cli_path: Option<String>,
    pub claude_timeout: Duration,
    pub cursor_timeout: Duration,
    /// Trigger phrases, in match order.
    pub claude_patterns: Vec<String>,
    /// Lower-cased alias → full model id.
    pub claude_model_aliases: HashMap<String, String>,
    pub cursor_working_dir: Option<PathBuf>,
    pub openai_api_key: Option<Secret<String>>,
    pub anthropic_api_key: Option<Secret<String>>,
    pub log_level: String,
    pub state_dir: PathBuf,
    pub stream_responses: bool,
}

impl RelayConfig {
    /// Merge `file` with an environment lookup; environment wins.
    pub fn from_sources(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let FileConfig {
            telegram,
            claude,
            cursor,
            media,
            relay,
        } = file;

        let telegram_bot_token = env("TELEGRAM_BOT_TOKEN")
            .or(telegram.bot_token)
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::Missing {
                var: "TELEGRAM_BOT_TOKEN",
            })?;
        let allowed_chat_id = env("ALLOWED_CHAT_ID")
            .or(telegram.allowed_chat_id)
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::Missing {
                var: "ALLOWED_CHAT_ID",
            })?;

        let claude_cli_path = env("CLAUDE_CLI_PATH")
            .or(claude.cli_path)
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_CLAUDE_CLI.into());
        // Set-but-empty is how the agent backend is switched off.
        let cursor_cli_path = env("CURSOR_CLI_PATH")
            .or(cursor.cli_path)
            .unwrap_or_else(|| DEFAULT_CURSOR_CLI.into());
        let cursor_cli_path = (!cursor_cli_path.is_empty()).then_some(cursor_cli_path);

        let claude_timeout = seconds(
            "CLAUDE_TIMEOUT",
            env("CLAUDE_TIMEOUT"),
            claude.timeout_secs,
            DEFAULT_CLAUDE_TIMEOUT_SECS,
        )?;
        let cursor_timeout = seconds(
            "CURSOR_TIMEOUT",
            env("CURSOR_TIMEOUT"),
            cursor.timeout_secs,
            DEFAULT_CURSOR_TIMEOUT_SECS,
        )?;

        let claude_patterns = match env("CLAUDE_PATTERNS") {
            Some(raw) => parse_patterns(&raw),
            None => claude
                .patterns
                .map(|p| clean_patterns(p.iter().map(String::as_str)))
                .unwrap_or_else(|| parse_patterns(DEFAULT_CLAUDE_PATTERNS)),
        };

        let claude_model_aliases = match env("CLAUDE_MODEL_ALIASES") {
            Some(raw) => parse_aliases(&raw),
            None => claude
                .model_aliases
                .map(|m| {
                    m.into_iter()
                        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
                        .collect()
                })
                .unwrap_or_else(|| parse_aliases(DEFAULT_MODEL_ALIASES)),
        };

        let cursor_working_dir = env("CURSOR_WORKING_DIR")
            .map(PathBuf::from)
            .or(cursor.working_dir)
            .filter(|p| !p.as_os_str().is_empty());

        let openai_api_key = secret(env("OPENAI_API_KEY").or(media.openai_api_key));
        let anthropic_api_key = secret(env("ANTHROPIC_API_KEY").or(media.anthropic_api_key));

        let log_level = env("LOG_LEVEL")
            .or(relay.log_level)
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.into())
            .to_lowercase();

        let state_dir = env("CLIRELAY_STATE_DIR")
            .map(PathBuf::from)
            .or(relay.state_dir)
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("."));

        let stream_responses = match env("STREAM_RESPONSES") {
            Some(raw) => parse_bool("STREAM_RESPONSES", &raw)?,
            None => relay.stream_responses.unwrap_or(true),
        };

        Ok(Self {
            telegram_bot_token: Secret::new(telegram_bot_token),
            allowed_chat_id,
            claude_cli_path,
            cursor_cli_path,
            claude_timeout,
            cursor_timeout,
            claude_patterns,
            claude_model_aliases,
            cursor_working_dir,
            openai_api_key,
            anthropic_api_key,
            log_level,
            state_dir,
            stream_responses,
        })
    }

    /// Resolve a `/model` argument: a known alias maps to its model id,
    /// anything else passes through trimmed.
    pub fn resolve_model_alias(&self, raw: &str) -> String {
        let raw = raw.trim();
        self.claude_model_aliases
            .get(&raw.to_lowercase())
            .cloned()
            .unwrap_or_else(|| raw.to_string())
    }

    pub fn voice_enabled(&self) -> bool {
        self.openai_api_key.is_some()
    }
}

fn secret(value: Option<String>) -> Option<Secret<String>> {
    value.filter(|v| !v.is_empty()).map(Secret::new)
}

fn seconds(
    var: &'static str,
    env: Option<String>,
    file: Option<u64>,
    default: u64,
) -> Result<Duration> {
    let secs = match env {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { var, value: raw })?,
        None => file.unwrap_or(default),
    };
    Ok(Duration::from_secs(secs))
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var,
            value: raw.to_string(),
        }),
    }
}

/// Comma-separated trigger phrases; blanks dropped, order kept.
pub fn parse_patterns(raw: &str) -> Vec<String> {
    clean_patterns(raw.split(','))
}

fn clean_patterns<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    items
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// `alias:model` pairs separated by commas. Pairs without a colon are
/// ignored; aliases are lower-cased.
pub fn parse_aliases(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once(':'))
        .map(|(alias, model)| (alias.trim().to_lowercase(), model.trim().to_string()))
        .filter(|(alias, _)| !alias.is_empty())
        .collect()
}
