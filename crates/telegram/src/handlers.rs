use {
    clirelay_chat::messages::{MSG_HELP, MSG_MODEL_USAGE},
    clirelay_common::ChatMessage,
    teloxide::{
        prelude::*,
        types::{BotCommand, MessageId},
    },
    tokio::time::Instant,
    tracing::{debug, error, info, warn},
};

use crate::{
    error::Result,
    outbound::{download_file, send_reply, send_streamed, start_typing},
    state::RelayState,
};

pub const MSG_VOICE_NOT_CONFIGURED: &str = "Voice messages are not supported in this setup.";
pub const MSG_VOICE_TRANSCRIPTION_FAILED: &str =
    "Could not transcribe voice message — please try again";
pub const MSG_IMAGE_NOT_CONFIGURED: &str = "Image analysis is not supported in this setup.";
pub const MSG_IMAGE_ANALYSIS_FAILED: &str = "Could not analyze image — please try again.";

/// Slash commands the bot answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Model,
    New,
    History,
}

impl Command {
    pub const ALL: [Self; 5] = [
        Self::Help,
        Self::Status,
        Self::Model,
        Self::New,
        Self::History,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Status => "status",
            Self::Model => "model",
            Self::New => "new",
            Self::History => "history",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Help => "Show available commands",
            Self::Status => "Current model, voice and agent status",
            Self::Model => "Switch model: /model claude|cursor <name>",
            Self::New => "Start a fresh session",
            Self::History => "Show recent exchanges",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Menu entries for `setMyCommands`.
    pub fn bot_commands() -> Vec<BotCommand> {
        Self::ALL
            .into_iter()
            .map(|c| BotCommand::new(c.name(), c.description()))
            .collect()
    }
}

/// Split `/name@bot args` into a lowercase name and trimmed args.
pub fn parse_command(text: &str) -> Option<(String, &str)> {
    let body = text.trim_start().strip_prefix('/')?;
    let (head, args) = body
        .split_once(char::is_whitespace)
        .unwrap_or((body, ""));
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() {
        return None;
    }
    Some((name.to_ascii_lowercase(), args.trim()))
}

/// `<provider> <model args>`, provider `claude` or `cursor`, args non-empty.
pub fn parse_model_args(args: &str) -> Option<(&str, &str)> {
    let (provider, rest) = args.trim().split_once(char::is_whitespace)?;
    let rest = rest.trim();
    let known = ["claude", "cursor"]
        .iter()
        .any(|p| provider.eq_ignore_ascii_case(p));
    (known && !rest.is_empty()).then_some((provider, rest))
}

/// Largest photo size, Telegram lists them ascending.
fn extract_photo_file(msg: &Message) -> Option<String> {
    msg.photo()
        .and_then(|sizes| sizes.last())
        .map(|ps| ps.file.id.clone())
}

fn extract_voice_file(msg: &Message) -> Option<String> {
    msg.voice().map(|v| v.file.id.clone())
}

/// Entry point for every inbound message.
pub async fn handle_message(msg: Message, bot: &Bot, state: &RelayState) -> Result<()> {
    let chat_id = msg.chat.id;
    let sender = chat_id.0.to_string();
    if !state.gate.allows_exact(&sender) {
        warn!(chat_id = chat_id.0, "blocked update from chat");
        return Ok(());
    }
    let timestamp = msg.date.timestamp();

    if let Some(text) = msg.text() {
        if let Some((name, args)) = parse_command(text) {
            return match Command::from_name(&name) {
                Some(command) => handle_command(bot, state, chat_id, command, args).await,
                None => {
                    debug!(command = %name, "ignoring unknown command");
                    Ok(())
                },
            };
        }
        let message = ChatMessage::new(sender, text.trim(), timestamp);
        return handle_text(bot, state, chat_id, msg.id, message).await;
    }

    if let Some(file_id) = extract_voice_file(&msg) {
        return handle_voice(bot, state, chat_id, &file_id, timestamp).await;
    }

    if let Some(file_id) = extract_photo_file(&msg) {
        return handle_photo(bot, state, chat_id, &file_id, msg.caption(), timestamp).await;
    }

    debug!(chat_id = chat_id.0, "ignoring unsupported message kind");
    Ok(())
}

/// Repeated text is answered every time; only a redelivered message id is
/// skipped.
async fn handle_text(
    bot: &Bot,
    state: &RelayState,
    chat_id: ChatId,
    message_id: MessageId,
    message: ChatMessage,
) -> Result<()> {
    if message.content.is_empty() {
        return Ok(());
    }
    let key = message_id.0.to_string();
    if state.processed.is_processed(&message.sender, &key) {
        debug!(message_id = message_id.0, "redelivered message, skipping");
        return Ok(());
    }
    let sender = message.sender.clone();
    process(bot, state, chat_id, message).await?;
    state.processed.mark_processed(&sender, &key);
    Ok(())
}

async fn handle_command(
    bot: &Bot,
    state: &RelayState,
    chat_id: ChatId,
    command: Command,
    args: &str,
) -> Result<()> {
    let sender = chat_id.0.to_string();
    info!(command = command.name(), "handling command");
    let reply = match command {
        Command::Help => MSG_HELP.to_string(),
        Command::Status => state.router.handle_status_command(),
        Command::History => state.router.handle_history_command(&sender),
        Command::New => state.router.handle_new_command(&sender),
        Command::Model => match parse_model_args(args) {
            Some((provider, model_args)) => {
                let _typing = start_typing(bot.clone(), chat_id);
                state
                    .router
                    .handle_model_command(&sender, provider, model_args)
                    .await
            },
            None => MSG_MODEL_USAGE.to_string(),
        },
    };
    send_reply(bot, chat_id, &reply).await?;
    Ok(())
}

async fn handle_voice(
    bot: &Bot,
    state: &RelayState,
    chat_id: ChatId,
    file_id: &str,
    timestamp: i64,
) -> Result<()> {
    let Some(transcriber) = state.transcriber.as_ref() else {
        send_reply(bot, chat_id, MSG_VOICE_NOT_CONFIGURED).await?;
        return Ok(());
    };

    let transcript = async {
        let audio = download_file(bot, file_id).await?;
        Ok::<_, crate::Error>(transcriber.transcribe(audio).await?)
    };
    let text = match transcript.await {
        Ok(text) => text,
        Err(e) => {
            warn!(chat_id = chat_id.0, error = %e, "voice transcription failed");
            send_reply(bot, chat_id, MSG_VOICE_TRANSCRIPTION_FAILED).await?;
            return Ok(());
        },
    };
    info!(chars = text.chars().count(), "voice note transcribed");

    let message = ChatMessage::new(chat_id.0.to_string(), text, timestamp);
    process(bot, state, chat_id, message).await
}

async fn handle_photo(
    bot: &Bot,
    state: &RelayState,
    chat_id: ChatId,
    file_id: &str,
    caption: Option<&str>,
    timestamp: i64,
) -> Result<()> {
    let Some(vision) = state.vision.as_ref() else {
        send_reply(bot, chat_id, MSG_IMAGE_NOT_CONFIGURED).await?;
        return Ok(());
    };

    let analysis = async {
        let image = download_file(bot, file_id).await?;
        Ok::<_, crate::Error>(vision.analyze(image, caption).await?)
    };
    let text = match analysis.await {
        Ok(text) => text,
        Err(e) => {
            warn!(chat_id = chat_id.0, error = %e, "image analysis failed");
            send_reply(bot, chat_id, MSG_IMAGE_ANALYSIS_FAILED).await?;
            return Ok(());
        },
    };
    info!(chars = text.chars().count(), "photo analyzed");

    let message = ChatMessage::new(chat_id.0.to_string(), text, timestamp);
    process(bot, state, chat_id, message).await
}

/// Route `message` and deliver the reply under a typing indicator.
async fn process(
    bot: &Bot,
    state: &RelayState,
    chat_id: ChatId,
    message: ChatMessage,
) -> Result<()> {
    let started = Instant::now();
    let typing = start_typing(bot.clone(), chat_id);

    let sent = if state.stream_responses {
        send_streamed(bot, chat_id, state.router.stream_handle(message)).await
    } else {
        let reply = state.router.handle(&message).await;
        drop(typing);
        send_reply(bot, chat_id, &reply).await
    };

    let elapsed = started.elapsed().as_secs_f64();
    match sent {
        Ok(true) => info!(elapsed_secs = elapsed, "reply sent"),
        Ok(false) => warn!("no response generated"),
        Err(e) => {
            error!(elapsed_secs = elapsed, error = %e, "reply send failed");
            return Err(e);
        },
    }
    Ok(())
}
