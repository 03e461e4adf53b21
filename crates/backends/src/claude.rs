//! Resumable assistant backend (Claude CLI).

use std::{sync::Arc, time::Duration};

use {
    clirelay_sessions::TokenStore,
    serde_json::Value,
    tracing::{debug, error, info},
};

use crate::{
    Error, MSG_TIMEOUT,
    process::{self, RunOpts, truncate_chars},
};

/// Characters of stderr quoted back to the user on failure.
const STDERR_PREVIEW_CHARS: usize = 100;

/// Where a sender's conversation stands with the resumable backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionToken {
    /// No session yet; the call must request a structured envelope.
    Fresh,
    /// Continue the given session; stdout is plain text.
    Resume(String),
}

impl SessionToken {
    pub fn from_stored(token: Option<String>) -> Self {
        match token {
            Some(token) if !token.is_empty() => Self::Resume(token),
            _ => Self::Fresh,
        }
    }

    pub fn is_resume(&self) -> bool {
        matches!(self, Self::Resume(_))
    }
}

/// Output format requested on a first call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    StreamJson,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::StreamJson => "stream-json",
        }
    }
}

/// `["--model", model]` when an override is set.
pub fn model_args(model: Option<&str>) -> Vec<String> {
    match model {
        Some(m) if !m.is_empty() => vec!["--model".into(), m.into()],
        _ => Vec::new(),
    }
}

/// Argument vector for one call. Resumed calls keep their plain-text shape
/// regardless of `format`.
pub fn build_args(
    text: &str,
    token: &SessionToken,
    format: OutputFormat,
    model: Option<&str>,
) -> Vec<String> {
    let mut args = vec!["-p".to_string(), text.to_string()];
    match token {
        SessionToken::Resume(id) => {
            args.push("--resume".into());
            args.push(id.clone());
        },
        SessionToken::Fresh => {
            args.push("--output-format".into());
            args.push(format.as_str().into());
        },
    }
    args.extend(model_args(model));
    args
}

/// Parsed first-call result envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub result: String,
    /// Present only when non-empty.
    pub session_id: Option<String>,
}

/// Parse `{"result": ..., "session_id": ...}`. `None` when stdout is not a
/// JSON object; a missing or non-string `result` reads as empty.
pub fn parse_envelope(stdout: &str) -> Option<Envelope> {
    let Value::Object(map) = serde_json::from_str::<Value>(stdout).ok()? else {
        return None;
    };
    let result = map
        .get("result")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let session_id = map
        .get("session_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Some(Envelope { result, session_id })
}

/// User-facing reply for a nonzero exit.
pub(crate) fn exit_error(stderr: &str) -> String {
    if stderr.is_empty() {
        "Error calling Claude: Unknown error".to_string()
    } else {
        format!(
            "Error calling Claude: {}",
            truncate_chars(stderr, STDERR_PREVIEW_CHARS)
        )
    }
}

/// Streaming variant of [`exit_error`]; an empty stderr drops the suffix.
pub(crate) fn stream_exit_error(stderr: &str) -> String {
    if stderr.is_empty() {
        "Error calling Claude".to_string()
    } else {
        format!(
            "Error calling Claude: {}",
            truncate_chars(stderr, STDERR_PREVIEW_CHARS)
        )
    }
}

pub struct ClaudeCli {
    pub(crate) program: String,
    pub(crate) timeout: Duration,
    pub(crate) sessions: Arc<TokenStore>,
}

impl ClaudeCli {
    pub fn new(program: impl Into<String>, timeout: Duration, sessions: Arc<TokenStore>) -> Self {
        Self {
            program: program.into(),
            timeout,
            sessions,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn sessions(&self) -> &TokenStore {
        &self.sessions
    }

    pub(crate) fn session_for(&self, sender: &str) -> SessionToken {
        SessionToken::from_stored(self.sessions.get(sender))
    }

    /// One request/response round trip. Always returns a reply string.
    pub async fn call(&self, sender: &str, text: &str, model: Option<&str>) -> String {
        let token = self.session_for(sender);
        let args = build_args(text, &token, OutputFormat::Json, model);
        info!(resume = token.is_resume(), model = model.unwrap_or("default"), "calling claude cli");

        let output = match process::run(&self.program, &args, &RunOpts::new(self.timeout)).await {
            Ok(output) => output,
            Err(Error::Timeout { after }) => {
                error!(timeout_secs = after.as_secs(), "claude cli timeout");
                return MSG_TIMEOUT.to_string();
            },
            Err(e) => {
                error!(error = %e, "error calling claude");
                return format!("Error: {e}");
            },
        };

        if !output.success() {
            error!(
                exit_code = output.exit_code,
                stderr = truncate_chars(&output.stderr, STDERR_PREVIEW_CHARS),
                "claude cli error"
            );
            return exit_error(&output.stderr);
        }

        match token {
            SessionToken::Resume(_) => output.stdout.trim().to_string(),
            SessionToken::Fresh => match parse_envelope(&output.stdout) {
                Some(envelope) => {
                    if let Some(id) = &envelope.session_id {
                        debug!(session_id = %id, "stored claude session");
                        self.sessions.set(sender, id);
                    }
                    envelope.result.trim().to_string()
                },
                None => {
                    debug!("claude output is not a result envelope, returning raw text");
                    output.stdout.trim().to_string()
                },
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn fresh_call_requests_json_envelope() {
        let args = build_args("fix bug", &SessionToken::Fresh, OutputFormat::Json, None);
        assert_eq!(args, ["-p", "fix bug", "--output-format", "json"]);
    }

    #[test]
    fn resume_call_passes_token() {
        let token = SessionToken::Resume("s1".into());
        let args = build_args("next", &token, OutputFormat::Json, None);
        assert_eq!(args, ["-p", "next", "--resume", "s1"]);
    }

    #[test]
    fn resume_keeps_shape_when_streaming() {
        let token = SessionToken::Resume("s1".into());
        let args = build_args("next", &token, OutputFormat::StreamJson, Some("opus"));
        assert_eq!(args, ["-p", "next", "--resume", "s1", "--model", "opus"]);
    }

    #[test]
    fn fresh_stream_call_requests_stream_json() {
        let args = build_args(
            "hi",
            &SessionToken::Fresh,
            OutputFormat::StreamJson,
            Some("claude-haiku"),
        );
        assert_eq!(args, [
            "-p",
            "hi",
            "--output-format",
            "stream-json",
            "--model",
            "claude-haiku"
        ]);
    }

    #[rstest]
    #[case(None, 0)]
    #[case(Some(""), 0)]
    #[case(Some("opus"), 2)]
    fn model_args_only_when_set(#[case] model: Option<&str>, #[case] len: usize) {
        assert_eq!(model_args(model).len(), len);
    }

    #[test]
    fn empty_stored_token_is_fresh() {
        assert_eq!(SessionToken::from_stored(Some(String::new())), SessionToken::Fresh);
        assert_eq!(SessionToken::from_stored(None), SessionToken::Fresh);
        assert!(SessionToken::from_stored(Some("x".into())).is_resume());
    }

    #[rstest]
    #[case(r#"{"result":"fixed","session_id":"s1"}"#, Some(("fixed", Some("s1"))))]
    #[case(r#"{"result":"ok","session_id":""}"#, Some(("ok", None)))]
    #[case(r#"{"session_id":"s2"}"#, Some(("", Some("s2"))))]
    #[case(r#"{"result":null}"#, Some(("", None)))]
    #[case("plain text", None)]
    #[case(r#""just a string""#, None)]
    #[case("", None)]
    fn envelope_parsing(#[case] input: &str, #[case] expected: Option<(&str, Option<&str>)>) {
        let parsed = parse_envelope(input);
        let expected = expected.map(|(result, id)| Envelope {
            result: result.into(),
            session_id: id.map(Into::into),
        });
        assert_eq!(parsed, expected);
    }

    #[test]
    fn exit_errors_truncate_stderr() {
        let long = "x".repeat(150);
        assert_eq!(exit_error(&long), format!("Error calling Claude: {}", "x".repeat(100)));
        assert_eq!(exit_error(""), "Error calling Claude: Unknown error");
        assert_eq!(stream_exit_error(""), "Error calling Claude");
        assert_eq!(stream_exit_error("boom"), "Error calling Claude: boom");
    }

    #[cfg(unix)]
    mod process_tests {
        use {super::*, crate::testutil};

        fn cli(dir: &tempfile::TempDir, body: &str) -> ClaudeCli {
            let program = testutil::fake_cli(dir.path(), "claude", body);
            let sessions = Arc::new(TokenStore::open(dir.path().join("sessions.json")));
            ClaudeCli::new(program.to_string_lossy(), Duration::from_secs(5), sessions)
        }

        #[tokio::test]
        async fn first_call_stores_session_then_resumes() {
            let dir = tempfile::tempdir().unwrap();
            let claude = cli(
                &dir,
                r#"case "$*" in
  *--resume*) echo "  resumed reply  " ;;
  *) echo '{"result":" fixed ","session_id":"s1"}' ;;
esac"#,
            );

            assert_eq!(claude.call("+1 555", "fix bug", None).await, "fixed");
            assert_eq!(claude.sessions().get("1555").as_deref(), Some("s1"));

            assert_eq!(claude.call("1555", "and again", None).await, "resumed reply");
            assert_eq!(testutil::invocations(dir.path()), vec![
                "-p fix bug --output-format json",
                "-p and again --resume s1",
            ]);
        }

        #[tokio::test]
        async fn model_override_is_forwarded() {
            let dir = tempfile::tempdir().unwrap();
            let claude = cli(&dir, "echo '{\"result\":\"ok\"}'");
            assert_eq!(claude.call("1", "hi", Some("claude-opus-4-6")).await, "ok");
            assert_eq!(testutil::invocations(dir.path()), vec![
                "-p hi --output-format json --model claude-opus-4-6"
            ]);
            // No session id in the envelope, so nothing is stored.
            assert!(claude.sessions().get("1").is_none());
        }

        #[tokio::test]
        async fn unparsable_envelope_returns_raw_stdout() {
            let dir = tempfile::tempdir().unwrap();
            let claude = cli(&dir, "echo '  not json  '");
            assert_eq!(claude.call("1", "hi", None).await, "not json");
            assert!(claude.sessions().is_empty());
        }

        #[tokio::test]
        async fn nonzero_exit_quotes_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let claude = cli(&dir, "echo 'rate limited' >&2; exit 1");
            assert_eq!(
                claude.call("1", "hi", None).await,
                "Error calling Claude: rate limited\n"
            );
        }

        #[tokio::test]
        async fn nonzero_exit_without_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let claude = cli(&dir, "exit 2");
            assert_eq!(
                claude.call("1", "hi", None).await,
                "Error calling Claude: Unknown error"
            );
        }

        #[tokio::test]
        async fn deadline_returns_timeout_message() {
            let dir = tempfile::tempdir().unwrap();
            let program = testutil::fake_cli(dir.path(), "claude", "echo partial; sleep 5");
            let sessions = Arc::new(TokenStore::open(dir.path().join("sessions.json")));
            let claude =
                ClaudeCli::new(program.to_string_lossy(), Duration::from_millis(300), sessions);
            assert_eq!(claude.call("1", "hi", None).await, MSG_TIMEOUT);
        }
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = Arc::new(TokenStore::open(dir.path().join("sessions.json")));
        let claude = ClaudeCli::new(
            "/nonexistent/claude-binary",
            Duration::from_secs(1),
            sessions,
        );
        let reply = claude.call("1", "hi", None).await;
        assert!(reply.starts_with("Error: failed to start /nonexistent/claude-binary"));
    }
}
