use std::path::Path;

use {
    anyhow::Result,
    clap::Subcommand,
    clirelay_config::{RelayConfig, config_dir, find_config_file},
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Resolve the configuration and print a redacted summary.
    Check,
    /// Show which config file would be loaded.
    Path,
}

pub fn handle_config(action: ConfigAction, explicit: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check => check(explicit),
        ConfigAction::Path => {
            match explicit.map(Path::to_path_buf).or_else(find_config_file) {
                Some(path) => println!("{}", path.display()),
                None => println!("no config file found (environment and defaults only)"),
            }
            if let Some(dir) = config_dir() {
                eprintln!("user config directory: {}", dir.display());
            }
            Ok(())
        },
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(explicit: Option<&Path>) -> Result<()> {
    match clirelay_config::load(explicit) {
        Ok(config) => {
            print!("{}", summary(&config));
            eprintln!("No issues found.");
            Ok(())
        },
        Err(e) => {
            eprintln!("  {BOLD}{RED}error{RESET} {e}");
            Err(e.into())
        },
    }
}

fn or_unset<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "not set".to_string(), |v| v.to_string())
}

/// Human-readable view of the resolved settings. Secrets show as set/unset.
pub fn summary(config: &RelayConfig) -> String {
    let secret = |s: bool| if s { "set" } else { "not set" };
    let vision = if config.anthropic_api_key.is_some() {
        "claude"
    } else if config.openai_api_key.is_some() {
        "openai"
    } else {
        "disabled"
    };
    let mut aliases: Vec<String> = config
        .claude_model_aliases
        .iter()
        .map(|(alias, model)| format!("{alias}={model}"))
        .collect();
    aliases.sort();

    let lines = [
        ("telegram token", "set".to_string()),
        ("allowed chat", config.allowed_chat_id.clone()),
        (
            "claude cli",
            format!(
                "{} ({}s)",
                config.claude_cli_path,
                config.claude_timeout.as_secs()
            ),
        ),
        (
            "cursor cli",
            match &config.cursor_cli_path {
                Some(path) => format!("{path} ({}s)", config.cursor_timeout.as_secs()),
                None => "not configured".to_string(),
            },
        ),
        (
            "cursor dir",
            or_unset(config.cursor_working_dir.as_ref().map(|p| p.display())),
        ),
        ("patterns", config.claude_patterns.join(", ")),
        ("aliases", aliases.join(", ")),
        ("openai key", secret(config.openai_api_key.is_some()).to_string()),
        (
            "anthropic key",
            secret(config.anthropic_api_key.is_some()).to_string(),
        ),
        ("vision", vision.to_string()),
        ("state dir", config.state_dir.display().to_string()),
        ("streaming", config.stream_responses.to_string()),
        ("log level", config.log_level.clone()),
    ];

    lines
        .iter()
        .map(|(label, value)| format!("{label:<14}: {value}\n"))
        .collect()
}
