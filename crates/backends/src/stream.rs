//! Streaming replies from the resumable assistant.
//!
//! With `--output-format stream-json` the CLI prints one JSON event per line.
//! [`StreamAccumulator`] folds those lines into a growing reply;
//! [`ClaudeCli::stream`] drives the child process and yields each snapshot.

use std::{pin::Pin, time::Duration};

use {
    serde::Deserialize,
    tokio::{
        io::{AsyncBufReadExt, AsyncReadExt, BufReader},
        time::{Instant, timeout_at},
    },
    tokio_stream::Stream,
    tracing::{debug, error, info, warn},
};

use crate::{
    ClaudeCli, Error, MSG_TIMEOUT,
    claude::{OutputFormat, build_args, stream_exit_error},
    process,
};

/// Progressive reply: every item is a complete, larger snapshot of the text.
pub type ReplyStream<'a> = Pin<Box<dyn Stream<Item = String> + Send + 'a>>;

/// Upper bound on accumulated text. Further appends are dropped.
pub const MAX_ACCUMULATED_BYTES: usize = 256 * 1024;

/// Stand-in deadline for timeouts too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `timeout` from now, saturating instead of overflowing.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or(now + FAR_FUTURE)
}

/// One decoded event line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Concatenated `text` blocks of an assistant message.
    Assistant { text: String },
    /// Terminal event carrying the authoritative reply and session id.
    Result {
        result: Option<String>,
        session_id: Option<String>,
    },
    /// Any other event type, or a line that is not an event at all.
    Unrecognized,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireEvent {
    Assistant {
        #[serde(default)]
        message: WireMessage,
    },
    Result {
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
}

#[derive(Default, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Vec<WireBlock>,
}

#[derive(Deserialize)]
struct WireBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

impl StreamEvent {
    pub fn parse(line: &str) -> Self {
        match serde_json::from_str::<WireEvent>(line) {
            Ok(WireEvent::Assistant { message }) => Self::Assistant {
                text: message
                    .content
                    .into_iter()
                    .filter(|block| block.kind == "text")
                    .map(|block| block.text)
                    .collect(),
            },
            Ok(WireEvent::Result { result, session_id }) => Self::Result { result, session_id },
            Err(_) => Self::Unrecognized,
        }
    }
}

/// What feeding one line produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Step {
    /// Snapshot to show the user, if any.
    pub chunk: Option<String>,
    /// Session id announced by a result event.
    pub session_id: Option<String>,
}

/// Folds event lines into the reply text.
#[derive(Debug)]
pub struct StreamAccumulator {
    text: String,
    limit: usize,
    capped: bool,
}

impl Default for StreamAccumulator {
    fn default() -> Self {
        Self::with_limit(MAX_ACCUMULATED_BYTES)
    }
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            capped: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Feed one raw stdout line. Blank lines produce nothing.
    ///
    /// Assistant fragments are appended as received, not trimmed, so a
    /// fragment such as `" world"` keeps its leading space. Blank-only
    /// fragments are still skipped.
    pub fn feed(&mut self, raw: &str) -> Step {
        let line = raw.trim();
        if line.is_empty() {
            return Step::default();
        }

        match StreamEvent::parse(line) {
            StreamEvent::Assistant { text } => {
                if text.trim().is_empty() {
                    return Step::default();
                }
                self.push(&text);
                Step {
                    chunk: Some(self.text.clone()),
                    session_id: None,
                }
            },
            StreamEvent::Result { result, session_id } => {
                let session_id = session_id.filter(|id| !id.is_empty());
                let chunk = result
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty() && *r != self.text.trim())
                    .map(str::to_string);
                Step { chunk, session_id }
            },
            StreamEvent::Unrecognized => {
                self.push(line);
                self.push("\n");
                Step {
                    chunk: Some(self.text.trim().to_string()),
                    session_id: None,
                }
            },
        }
    }

    fn push(&mut self, s: &str) {
        if self.capped {
            return;
        }
        let room = self.limit.saturating_sub(self.text.len());
        if s.len() <= room {
            self.text.push_str(s);
            return;
        }
        let mut cut = room;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        self.text.push_str(&s[..cut]);
        self.capped = true;
        warn!(limit = self.limit, "streamed reply hit size cap, dropping further text");
    }
}

impl ClaudeCli {
    /// Streaming round trip. Yields accumulated snapshots, an optional final
    /// correction from the result event, and at most one error chunk.
    ///
    /// Dropping the stream abandons the child, which is killed.
    pub fn stream(&self, sender: String, text: String, model: Option<String>) -> ReplyStream<'_> {
        Box::pin(async_stream::stream! {
            let token = self.session_for(&sender);
            let args = build_args(&text, &token, OutputFormat::StreamJson, model.as_deref());
            info!(resume = token.is_resume(), "streaming claude cli");

            let deadline = deadline_after(self.timeout);
            let mut child = match process::command(&self.program, &args, None).spawn() {
                Ok(child) => child,
                Err(e) => {
                    let e = Error::spawn(self.program.as_str(), e);
                    error!(error = %e, "error streaming claude");
                    yield format!("Error: {e}");
                    return;
                },
            };

            let Some(stdout) = child.stdout.take() else {
                yield "Error: No stdout from Claude process".to_string();
                return;
            };
            // A full stderr pipe blocks the child.
            let stderr_task = child.stderr.take().map(|mut stderr| {
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    if let Err(e) = stderr.read_to_end(&mut buf).await {
                        debug!(error = %e, "claude stderr read failed");
                    }
                    String::from_utf8_lossy(&buf).into_owned()
                })
            });

            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            let mut acc = StreamAccumulator::new();
            loop {
                buf.clear();
                match timeout_at(deadline, reader.read_until(b'\n', &mut buf)).await {
                    Ok(Ok(0)) => break,
                    Ok(Ok(_)) => {},
                    Ok(Err(e)) => {
                        error!(error = %e, "claude stream read failed");
                        yield format!("Error: {e}");
                        return;
                    },
                    Err(_) => {
                        error!(timeout_secs = self.timeout.as_secs(), "claude cli timeout");
                        yield MSG_TIMEOUT.to_string();
                        return;
                    },
                }

                let step = acc.feed(&String::from_utf8_lossy(&buf));
                if let Some(id) = step.session_id {
                    debug!(session_id = %id, "stored claude session");
                    self.sessions.set(&sender, &id);
                }
                if let Some(chunk) = step.chunk {
                    yield chunk;
                }
            }

            let status = match timeout_at(deadline, child.wait()).await {
                Ok(Ok(status)) => status,
                Ok(Err(e)) => {
                    error!(error = %e, "claude wait failed");
                    yield format!("Error: {e}");
                    return;
                },
                Err(_) => {
                    error!(timeout_secs = self.timeout.as_secs(), "claude cli timeout");
                    yield MSG_TIMEOUT.to_string();
                    return;
                },
            };

            if !status.success() {
                let stderr = match stderr_task {
                    Some(task) => task.await.unwrap_or_default(),
                    None => String::new(),
                };
                error!(exit_code = status.code().unwrap_or(-1), "claude cli error");
                yield stream_exit_error(&stderr);
            }
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn assistant(text: &str) -> String {
        serde_json::json!({
            "type": "assistant",
            "message": { "content": [{ "type": "text", "text": text }] }
        })
        .to_string()
    }

    #[test]
    fn assistant_fragments_accumulate() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.feed(&assistant("Hel")).chunk.as_deref(), Some("Hel"));
        assert_eq!(acc.feed(&assistant("lo")).chunk.as_deref(), Some("Hello"));
        assert_eq!(acc.text(), "Hello");
    }

    #[test]
    fn fragment_boundary_spaces_are_kept() {
        let mut acc = StreamAccumulator::new();
        acc.feed(&assistant("Hello"));
        assert_eq!(acc.feed(&assistant(" world")).chunk.as_deref(), Some("Hello world"));
    }

    #[test]
    fn huge_timeout_saturates() {
        assert!(deadline_after(Duration::from_secs(u64::MAX)) > Instant::now());
    }

    #[test]
    fn only_text_blocks_are_concatenated() {
        let line = serde_json::json!({
            "type": "assistant",
            "message": { "content": [
                { "type": "text", "text": "a" },
                { "type": "tool_use", "name": "Bash", "input": {} },
                { "type": "text", "text": "b" }
            ]}
        })
        .to_string();
        assert_eq!(StreamEvent::parse(&line), StreamEvent::Assistant { text: "ab".into() });
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn blank_lines_are_skipped(#[case] line: &str) {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.feed(line), Step::default());
        assert_eq!(acc.text(), "");
    }

    #[test]
    fn blank_assistant_text_yields_nothing() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.feed(&assistant("  ")), Step::default());
    }

    #[test]
    fn result_reports_session_and_correction() {
        let mut acc = StreamAccumulator::new();
        acc.feed(&assistant("draft"));
        let step = acc.feed(r#"{"type":"result","result":" final ","session_id":"s1"}"#);
        assert_eq!(step.chunk.as_deref(), Some("final"));
        assert_eq!(step.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn result_matching_accumulator_is_not_repeated() {
        let mut acc = StreamAccumulator::new();
        acc.feed(&assistant("Hello"));
        let step = acc.feed(r#"{"type":"result","result":"Hello\n","session_id":""}"#);
        assert_eq!(step, Step::default());
    }

    #[test]
    fn unrecognized_lines_are_appended_raw() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.feed("plain output").chunk.as_deref(), Some("plain output"));
        assert_eq!(
            acc.feed(r#"{"type":"system","subtype":"init"}"#).chunk.as_deref(),
            Some("plain output\n{\"type\":\"system\",\"subtype\":\"init\"}")
        );
        assert!(acc.text().ends_with('\n'));
    }

    #[test]
    fn accumulator_stops_growing_at_limit() {
        let mut acc = StreamAccumulator::with_limit(8);
        acc.feed(&assistant("héllo"));
        acc.feed(&assistant("wörld"));
        assert!(acc.text().len() <= 8);
        assert_eq!(acc.text(), "héllow");
        acc.feed(&assistant("more"));
        assert_eq!(acc.text(), "héllow");
    }

    #[cfg(unix)]
    mod process_tests {
        use {
            super::*,
            crate::testutil,
            clirelay_sessions::TokenStore,
            futures::StreamExt,
            std::{sync::Arc, time::Duration},
        };

        fn cli(dir: &tempfile::TempDir, body: &str, timeout: Duration) -> ClaudeCli {
            let program = testutil::fake_cli(dir.path(), "claude", body);
            let sessions = Arc::new(TokenStore::open(dir.path().join("sessions.json")));
            ClaudeCli::new(program.to_string_lossy(), timeout, sessions)
        }

        #[tokio::test]
        async fn streams_snapshots_and_stores_session() {
            let dir = tempfile::tempdir().unwrap();
            let claude = cli(
                &dir,
                r#"echo '{"type":"assistant","message":{"content":[{"type":"text","text":"Hel"}]}}'
echo ''
echo '{"type":"assistant","message":{"content":[{"type":"text","text":"lo"}]}}'
echo '{"type":"result","result":"Hello","session_id":"s9"}'"#,
                Duration::from_secs(5),
            );

            let chunks: Vec<String> = claude
                .stream("+1 555".into(), "say hi".into(), None)
                .collect()
                .await;
            assert_eq!(chunks, vec!["Hel", "Hello"]);
            assert_eq!(claude.sessions().get("1555").as_deref(), Some("s9"));
            assert_eq!(testutil::invocations(dir.path()), vec![
                "-p say hi --output-format stream-json"
            ]);
        }

        #[tokio::test]
        async fn resumed_stream_keeps_resume_shape() {
            let dir = tempfile::tempdir().unwrap();
            let claude = cli(&dir, "echo 'plain reply'", Duration::from_secs(5));
            claude.sessions().set("1", "s1");
            let chunks: Vec<String> = claude
                .stream("1".into(), "next".into(), Some("opus-id".into()))
                .collect()
                .await;
            assert_eq!(chunks, vec!["plain reply"]);
            assert_eq!(testutil::invocations(dir.path()), vec![
                "-p next --resume s1 --model opus-id"
            ]);
        }

        #[tokio::test]
        async fn nonzero_exit_appends_error_chunk() {
            let dir = tempfile::tempdir().unwrap();
            let claude = cli(&dir, "echo 'overloaded' >&2; exit 1", Duration::from_secs(5));
            let chunks: Vec<String> = claude.stream("1".into(), "hi".into(), None).collect().await;
            assert_eq!(chunks, vec!["Error calling Claude: overloaded\n"]);
        }

        #[tokio::test]
        async fn nonzero_exit_with_empty_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let claude = cli(&dir, "exit 1", Duration::from_secs(5));
            let chunks: Vec<String> = claude.stream("1".into(), "hi".into(), None).collect().await;
            assert_eq!(chunks, vec!["Error calling Claude"]);
        }

        #[tokio::test]
        async fn deadline_yields_timeout_and_stops() {
            let dir = tempfile::tempdir().unwrap();
            let claude = cli(
                &dir,
                r#"echo '{"type":"assistant","message":{"content":[{"type":"text","text":"partial"}]}}'
sleep 5"#,
                Duration::from_millis(500),
            );
            let chunks: Vec<String> = claude.stream("1".into(), "hi".into(), None).collect().await;
            assert_eq!(chunks, vec!["partial".to_string(), MSG_TIMEOUT.to_string()]);
        }

        #[tokio::test]
        async fn huge_timeout_does_not_overflow() {
            let dir = tempfile::tempdir().unwrap();
            let claude = cli(
                &dir,
                r#"echo '{"type":"result","result":"done","session_id":"s1"}'"#,
                Duration::from_secs(u64::MAX),
            );
            let chunks: Vec<String> = claude.stream("1".into(), "hi".into(), None).collect().await;
            assert_eq!(chunks, vec!["done"]);
        }

        #[tokio::test]
        async fn dropping_the_stream_early_is_harmless() {
            let dir = tempfile::tempdir().unwrap();
            let claude = cli(
                &dir,
                r#"echo '{"type":"assistant","message":{"content":[{"type":"text","text":"first"}]}}'
sleep 5"#,
                Duration::from_secs(10),
            );
            let mut stream = claude.stream("1".into(), "hi".into(), None);
            assert_eq!(stream.next().await.as_deref(), Some("first"));
            drop(stream);
        }

        #[tokio::test]
        async fn spawn_failure_yields_error() {
            let dir = tempfile::tempdir().unwrap();
            let sessions = Arc::new(TokenStore::open(dir.path().join("sessions.json")));
            let claude = ClaudeCli::new("/nonexistent/claude", Duration::from_secs(1), sessions);
            let chunks: Vec<String> = claude.stream("1".into(), "hi".into(), None).collect().await;
            assert_eq!(chunks.len(), 1);
            assert!(chunks[0].starts_with("Error: failed to start"));
        }
    }
}
