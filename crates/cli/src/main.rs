mod config_commands;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    clap::{Parser, Subcommand},
    clirelay_chat::MessageRouter,
    clirelay_common::ChatMessage,
    clirelay_config::RelayConfig,
    clirelay_media::{Transcriber, WhisperTranscriber, select_vision},
    clirelay_telegram::RelayState,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "clirelay",
    about = "clirelay: drive the Claude and Cursor CLIs from Telegram"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: ./clirelay.toml, then the user config dir).
    #[arg(long, global = true, env = "CLIRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(long, global = true, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram relay (default when no subcommand is provided).
    Run,
    /// Route one message through the backends and print the reply.
    Ask {
        /// Message text, tags included.
        message: String,
        /// Sender id; defaults to the allowed chat id.
        #[arg(long)]
        sender: Option<String>,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

/// `RUST_LOG` wins over the resolved level.
fn init_telemetry(level: &str, json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn build_state(config: Arc<RelayConfig>) -> RelayState {
    let transcriber = config.openai_api_key.clone().map(|key| {
        Arc::new(WhisperTranscriber::new(key)) as Arc<dyn Transcriber>
    });
    let vision = select_vision(
        config.anthropic_api_key.as_ref(),
        config.openai_api_key.as_ref(),
    );
    info!(
        voice = transcriber.is_some(),
        vision = vision.is_some(),
        streaming = config.stream_responses,
        "media collaborators configured"
    );
    RelayState::new(MessageRouter::new(config))
        .with_transcriber(transcriber)
        .with_vision(vision)
}

async fn run(config: Arc<RelayConfig>) -> anyhow::Result<()> {
    let bot = clirelay_telegram::build_bot(&config.telegram_bot_token)?;
    let state = Arc::new(build_state(config));
    let cancel = clirelay_telegram::start_polling(bot, state).await?;

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutdown requested");
            cancel.cancel();
        },
        () = cancel.cancelled() => {
            warn!("polling stopped, exiting");
        },
    }
    Ok(())
}

async fn ask(config: Arc<RelayConfig>, message: String, sender: Option<String>) {
    let sender = sender.unwrap_or_else(|| config.allowed_chat_id.clone());
    let router = MessageRouter::new(config);
    let reply = router.handle(&ChatMessage::new(sender, message, 0)).await;
    println!("{reply}");
}

/// Load the configuration, then start logging at the resolved level.
fn startup(
    config_path: Option<&Path>,
    log_level: Option<&str>,
    json_logs: bool,
) -> anyhow::Result<Arc<RelayConfig>> {
    let loaded = clirelay_config::load(config_path);
    let level = log_level
        .map(str::to_string)
        .or_else(|| loaded.as_ref().ok().map(|c| c.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    init_telemetry(&level, json_logs);

    let config = loaded?;
    info!(version = env!("CARGO_PKG_VERSION"), "clirelay starting");
    Ok(Arc::new(config))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    let log_level = cli.log_level.as_deref();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Config { action } => config_commands::handle_config(action, config_path),
        Commands::Run => run(startup(config_path, log_level, cli.json_logs)?).await,
        Commands::Ask { message, sender } => {
            let config = startup(config_path, log_level, cli.json_logs)?;
            ask(config, message, sender).await;
            Ok(())
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_to_run() {
        let cli = Cli::try_parse_from(["clirelay", "--json-logs"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.json_logs);
    }

    #[test]
    fn ask_takes_message_and_sender() {
        let cli = Cli::try_parse_from([
            "clirelay",
            "ask",
            "@claude hello",
            "--sender",
            "7",
            "--config",
            "/tmp/x.toml",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Ask { message, sender }) => {
                assert_eq!(message, "@claude hello");
                assert_eq!(sender.as_deref(), Some("7"));
            },
            _ => panic!("expected ask"),
        }
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.toml")));
    }

    #[test]
    fn config_subcommands_parse() {
        let cli = Cli::try_parse_from(["clirelay", "config", "check"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Config {
            action: config_commands::ConfigAction::Check
        })));
    }
}
