//! Child-process launch with captured output and a hard deadline.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {tokio::process::Command, tracing::debug};

use crate::{Error, Result};

/// Captured result of a finished child.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `-1` when the child was killed by a signal.
    pub exit_code: i32,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone)]
pub struct RunOpts {
    pub timeout: Duration,
    pub working_dir: Option<PathBuf>,
}

impl RunOpts {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            working_dir: None,
        }
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }
}

/// Build a command with piped stdout/stderr, no stdin, and kill-on-drop so an
/// abandoned child does not outlive its caller.
pub fn command(program: &str, args: &[String], working_dir: Option<&Path>) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(Stdio::null());
    cmd.kill_on_drop(true);
    cmd
}

/// Run `program` to completion, or fail with [`Error::Timeout`] once
/// `opts.timeout` elapses. Output is decoded lossily.
pub async fn run(program: &str, args: &[String], opts: &RunOpts) -> Result<ProcessOutput> {
    debug!(
        program,
        argc = args.len(),
        timeout_secs = opts.timeout.as_secs(),
        "spawning backend"
    );

    let child = command(program, args, opts.working_dir.as_deref())
        .spawn()
        .map_err(|e| Error::spawn(program, e))?;

    let output = match tokio::time::timeout(opts.timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        // Dropping the future drops the child, which kills it.
        Err(_) => {
            return Err(Error::Timeout {
                after: opts.timeout,
            });
        },
    };

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    debug!(
        program,
        exit_code,
        stdout_len = stdout.len(),
        stderr_len = stderr.len(),
        "backend exited"
    );

    Ok(ProcessOutput {
        stdout,
        stderr,
        exit_code,
    })
}

/// First `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let args = vec!["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()];
        let out = run("sh", &args, &RunOpts::new(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let args = vec!["-c".to_string(), "pwd".to_string()];
        let opts =
            RunOpts::new(Duration::from_secs(5)).with_working_dir(Some(dir.path().to_path_buf()));
        let out = run("sh", &args, &opts).await.unwrap();
        let reported = std::fs::canonicalize(out.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn deadline_expiry_is_a_timeout() {
        let args = vec!["-c".to_string(), "sleep 5".to_string()];
        let started = std::time::Instant::now();
        let err = run("sh", &args, &RunOpts::new(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = run(
            "/nonexistent/clirelay-test-binary",
            &[],
            &RunOpts::new(Duration::from_secs(1)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
        assert!(err.to_string().contains("/nonexistent/clirelay-test-binary"));
    }
}
