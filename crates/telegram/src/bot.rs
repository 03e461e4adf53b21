use std::{sync::Arc, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, UpdateKind},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    handlers::{self, Command},
    state::RelayState,
};

/// Long-poll timeout sent to `getUpdates`, in seconds.
const POLL_TIMEOUT_SECS: u32 = 30;

/// Must outlive the long poll or the client aborts it first.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(45);

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Build a bot whose HTTP client tolerates long polling.
pub fn build_bot(token: &Secret<String>) -> anyhow::Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(CLIENT_TIMEOUT)
        .build()?;
    Ok(Bot::with_client(token.expose_secret(), client))
}

fn is_conflict(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::TerminatedByOtherGetUpdates))
}

/// Connect, register commands and spawn the polling loop.
///
/// Updates are handled one at a time, in order, until the returned token is
/// cancelled or another instance starts polling with the same token.
pub async fn start_polling(bot: Bot, state: Arc<RelayState>) -> anyhow::Result<CancellationToken> {
    let me = bot.get_me().await?;
    bot.delete_webhook().send().await?;

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("failed to register bot commands: {e}");
    }

    info!(username = ?me.username, "telegram bot connected");

    let cancel = CancellationToken::new();
    let poll_cancel = cancel.clone();
    tokio::spawn(async move {
        info!("starting telegram polling loop");
        let mut offset: i32 = 0;

        loop {
            let request = bot
                .get_updates()
                .offset(offset)
                .timeout(POLL_TIMEOUT_SECS)
                .allowed_updates(vec![AllowedUpdate::Message]);

            let result = tokio::select! {
                () = poll_cancel.cancelled() => {
                    info!("telegram polling stopped");
                    break;
                },
                result = request.send() => result,
            };

            match result {
                Ok(updates) => {
                    debug!(count = updates.len(), "got telegram updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        match update.kind {
                            UpdateKind::Message(msg) => {
                                debug!(chat_id = msg.chat.id.0, "received telegram message");
                                if let Err(e) = handlers::handle_message(msg, &bot, &state).await
                                {
                                    error!(error = %e, "error handling telegram message");
                                }
                            },
                            other => {
                                debug!("ignoring non-message update: {other:?}");
                            },
                        }
                    }
                },
                Err(e) if is_conflict(&e) => {
                    warn!("another instance is already polling with this token, stopping");
                    poll_cancel.cancel();
                    break;
                },
                Err(e) => {
                    warn!(error = %e, "telegram getUpdates failed");
                    tokio::select! {
                        () = poll_cancel.cancelled() => break,
                        () = tokio::time::sleep(RETRY_DELAY) => {},
                    }
                },
            }
        }
    });

    Ok(cancel)
}
