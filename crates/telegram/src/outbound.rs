use std::time::Duration;

use {
    bytes::Bytes,
    teloxide::{
        ApiError, RequestError,
        net::Download,
        prelude::*,
        types::{ChatAction, MessageId},
    },
    tokio::time::Instant,
    tokio_stream::{Stream, StreamExt},
    tokio_util::sync::{CancellationToken, DropGuard},
    tracing::{debug, warn},
};

use crate::error::Result;

/// Telegram message text limit.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

/// The typing action expires after about five seconds.
pub const TYPING_INTERVAL: Duration = Duration::from_secs(4);

/// Minimum gap between in-place edits of a streamed reply.
pub const STREAM_EDIT_INTERVAL: Duration = Duration::from_secs(1);

pub const STREAM_PLACEHOLDER: &str = "...";

/// Keep the typing indicator alive until the returned guard is dropped.
pub fn start_typing(bot: Bot, chat_id: ChatId) -> DropGuard {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                sent = bot.send_chat_action(chat_id, ChatAction::Typing).send() => {
                    if let Err(e) = sent {
                        debug!(chat_id = chat_id.0, error = %e, "typing action failed");
                    }
                },
            }
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(TYPING_INTERVAL) => {},
            }
        }
    });
    cancel.drop_guard()
}

/// Split `text` into pieces of at most `max_chars` characters, breaking at
/// the last newline inside each window when there is one.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let Some((end, _)) = rest.char_indices().nth(max_chars) else {
            chunks.push(rest.to_string());
            break;
        };
        let cut = rest[..end]
            .rfind('\n')
            .filter(|&i| i > 0)
            .unwrap_or(end);
        chunks.push(rest[..cut].to_string());
        rest = rest[cut..].trim_start_matches('\n');
    }
    chunks
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn is_message_not_modified_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::MessageNotModified))
}

/// Send `reply` as one or more messages. Returns `false` when there was
/// nothing to send.
pub async fn send_reply(bot: &Bot, chat_id: ChatId, reply: &str) -> Result<bool> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Ok(false);
    }
    for chunk in split_message(reply, TELEGRAM_MAX_MESSAGE_LEN) {
        bot.send_message(chat_id, chunk).await?;
    }
    Ok(true)
}

async fn edit_text(bot: &Bot, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<()> {
    match bot.edit_message_text(chat_id, message_id, text).await {
        Ok(_) => Ok(()),
        Err(e) if is_message_not_modified_error(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Deliver a stream of progressively larger snapshots by editing one
/// message in place.
///
/// A placeholder goes out first. Each snapshot may replace it, at most once
/// per [`STREAM_EDIT_INTERVAL`]; the final snapshot always lands, with any
/// overflow past the message limit sent as follow-up messages. An empty
/// final reply removes the placeholder and returns `false`.
pub async fn send_streamed<S>(bot: &Bot, chat_id: ChatId, mut snapshots: S) -> Result<bool>
where
    S: Stream<Item = String> + Unpin,
{
    let message_id = bot.send_message(chat_id, STREAM_PLACEHOLDER).await?.id;
    let mut last_edit = Instant::now();
    let mut shown = String::new();
    let mut latest = String::new();

    while let Some(snapshot) = snapshots.next().await {
        latest = snapshot;
        if last_edit.elapsed() < STREAM_EDIT_INTERVAL {
            continue;
        }
        let display = truncate_chars(latest.trim(), TELEGRAM_MAX_MESSAGE_LEN);
        if display.is_empty() || display == shown {
            continue;
        }
        match edit_text(bot, chat_id, message_id, display).await {
            Ok(()) => shown = display.to_string(),
            Err(e) => warn!(chat_id = chat_id.0, error = %e, "stream edit failed"),
        }
        last_edit = Instant::now();
    }

    let chunks = split_message(latest.trim(), TELEGRAM_MAX_MESSAGE_LEN);
    let Some((first, rest)) = chunks.split_first() else {
        if let Err(e) = bot.delete_message(chat_id, message_id).await {
            debug!(chat_id = chat_id.0, error = %e, "failed to delete stream placeholder");
        }
        return Ok(false);
    };
    if *first != shown {
        edit_text(bot, chat_id, message_id, first).await?;
    }
    for chunk in rest {
        bot.send_message(chat_id, chunk.as_str()).await?;
    }
    Ok(true)
}

/// Fetch a file the user sent, by its Bot API file id.
pub async fn download_file(bot: &Bot, file_id: &str) -> Result<Bytes> {
    let file = bot.get_file(file_id).await?;
    let mut buf: Vec<u8> = Vec::new();
    bot.download_file(&file.path, &mut buf).await?;
    debug!(bytes = buf.len(), path = %file.path, "downloaded telegram file");
    Ok(Bytes::from(buf))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests {
    use {super::*, mockito::Matcher, serde_json::json};

    pub(crate) const SENT_MESSAGE: &str = r#"{"ok":true,"result":{"message_id":1,"date":0,"chat":{"id":42,"type":"private","first_name":"A"},"text":"ok"}}"#;
    pub(crate) const OK_TRUE: &str = r#"{"ok":true,"result":true}"#;

    pub(crate) fn bot(server: &mockito::Server) -> Bot {
        let url = reqwest::Url::parse(&format!("{}/", server.url())).unwrap();
        Bot::new("test-token").set_api_url(url)
    }

    pub(crate) fn method(name: &str) -> Matcher {
        Matcher::Regex(format!("/{name}$"))
    }

    #[test]
    fn split_short_text_is_one_chunk() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
        assert!(split_message("", 10).is_empty());
        assert!(split_message("x", 0).is_empty());
    }

    #[test]
    fn split_prefers_newlines() {
        let chunks = split_message("aaaa\nbbbb\ncc", 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb", "cc"]);
    }

    #[test]
    fn split_hard_cuts_long_lines_on_char_boundaries() {
        let text = "é".repeat(25);
        let chunks = split_message(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 5), "hi");
    }

    #[test]
    fn not_modified_is_recognized() {
        assert!(is_message_not_modified_error(&RequestError::Api(
            ApiError::MessageNotModified
        )));
        assert!(!is_message_not_modified_error(&RequestError::Api(
            ApiError::BotBlocked
        )));
    }

    #[tokio::test]
    async fn blank_reply_sends_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        assert!(!send_reply(&bot(&server), ChatId(42), "  \n").await.unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn long_reply_is_split() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", method("SendMessage"))
            .match_body(Matcher::PartialJson(json!({ "chat_id": 42 })))
            .with_header("content-type", "application/json")
            .with_body(SENT_MESSAGE)
            .expect(2)
            .create_async()
            .await;
        let reply = "x".repeat(TELEGRAM_MAX_MESSAGE_LEN + 1);
        assert!(send_reply(&bot(&server), ChatId(42), &reply).await.unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn streamed_reply_edits_placeholder_with_final_snapshot() {
        let mut server = mockito::Server::new_async().await;
        let placeholder = server
            .mock("POST", method("SendMessage"))
            .match_body(Matcher::PartialJson(json!({ "text": STREAM_PLACEHOLDER })))
            .with_header("content-type", "application/json")
            .with_body(SENT_MESSAGE)
            .expect(1)
            .create_async()
            .await;
        let edit = server
            .mock("POST", method("EditMessageText"))
            .match_body(Matcher::PartialJson(json!({
                "chat_id": 42,
                "message_id": 1,
                "text": "Hello there",
            })))
            .with_header("content-type", "application/json")
            .with_body(SENT_MESSAGE)
            .expect(1)
            .create_async()
            .await;

        let snapshots = tokio_stream::iter(vec![
            "Hel".to_string(),
            "Hello".to_string(),
            "Hello there".to_string(),
        ]);
        assert!(
            send_streamed(&bot(&server), ChatId(42), snapshots)
                .await
                .unwrap()
        );
        placeholder.assert_async().await;
        edit.assert_async().await;
    }

    #[tokio::test]
    async fn empty_stream_removes_placeholder() {
        let mut server = mockito::Server::new_async().await;
        let _placeholder = server
            .mock("POST", method("SendMessage"))
            .with_header("content-type", "application/json")
            .with_body(SENT_MESSAGE)
            .create_async()
            .await;
        let delete = server
            .mock("POST", method("DeleteMessage"))
            .match_body(Matcher::PartialJson(json!({ "message_id": 1 })))
            .with_header("content-type", "application/json")
            .with_body(OK_TRUE)
            .expect(1)
            .create_async()
            .await;

        let snapshots = tokio_stream::iter(vec!["  ".to_string()]);
        assert!(
            !send_streamed(&bot(&server), ChatId(42), snapshots)
                .await
                .unwrap()
        );
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn download_resolves_path_then_fetches_bytes() {
        let mut server = mockito::Server::new_async().await;
        let _get_file = server
            .mock("POST", method("GetFile"))
            .match_body(Matcher::PartialJson(json!({ "file_id": "voice-1" })))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"ok":true,"result":{"file_id":"voice-1","file_unique_id":"u1","file_size":4,"file_path":"voice/file_1.oga"}}"#,
            )
            .create_async()
            .await;
        let _file = server
            .mock("GET", "/file/bottest-token/voice/file_1.oga")
            .with_body("OggS")
            .create_async()
            .await;

        let bytes = download_file(&bot(&server), "voice-1").await.unwrap();
        assert_eq!(&bytes[..], b"OggS");
    }
}
