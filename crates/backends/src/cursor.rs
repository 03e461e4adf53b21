//! Agentic backend (Cursor Agent CLI).

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    clirelay_sessions::TokenStore,
    tracing::{debug, error, info, warn},
};

use crate::{
    Error, MSG_NO_AGENT, MSG_NO_AGENT_RESPONSE, MSG_TIMEOUT,
    process::{self, RunOpts, truncate_chars},
};

/// Deadline for the `create-chat` step.
pub const CREATE_CHAT_TIMEOUT: Duration = Duration::from_secs(10);

const STDERR_PREVIEW_CHARS: usize = 200;

pub fn create_chat_args() -> Vec<String> {
    vec!["create-chat".into(), "--trust".into()]
}

pub fn call_args(text: &str, chat_id: Option<&str>) -> Vec<String> {
    let mut args = vec!["--trust".to_string(), "-p".to_string(), text.to_string()];
    if let Some(id) = chat_id {
        args.push("--resume".into());
        args.push(id.into());
    }
    args
}

pub struct CursorAgent {
    program: Option<String>,
    timeout: Duration,
    working_dir: Option<PathBuf>,
    chats: Arc<TokenStore>,
}

impl CursorAgent {
    /// `program = None` leaves the backend unconfigured; every call then
    /// answers with a fixed message.
    pub fn new(
        program: Option<String>,
        timeout: Duration,
        working_dir: Option<PathBuf>,
        chats: Arc<TokenStore>,
    ) -> Self {
        Self {
            program: program.filter(|p| !p.is_empty()),
            timeout,
            working_dir,
            chats,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.program.is_some()
    }

    pub fn program(&self) -> Option<&str> {
        self.program.as_deref()
    }

    pub fn chats(&self) -> &TokenStore {
        &self.chats
    }

    /// One round trip, creating the sender's chat first if needed.
    pub async fn call(&self, sender: &str, text: &str) -> String {
        let Some(program) = self.program.as_deref() else {
            return MSG_NO_AGENT.to_string();
        };

        let chat_id = match self.chats.get(sender).filter(|id| !id.is_empty()) {
            Some(id) => Some(id),
            None => self.create_chat(program, sender).await,
        };

        let args = call_args(text, chat_id.as_deref());
        info!(resume = chat_id.is_some(), "calling cursor agent");
        let opts = RunOpts::new(self.timeout).with_working_dir(self.working_dir.clone());

        let output = match process::run(program, &args, &opts).await {
            Ok(output) => output,
            Err(Error::Timeout { after }) => {
                error!(timeout_secs = after.as_secs(), "cursor agent timeout");
                return MSG_TIMEOUT.to_string();
            },
            Err(e) => {
                error!(error = %e, "error calling cursor agent");
                return format!("Error: {e}");
            },
        };

        let response = output.stdout.trim();
        match (output.success(), response.is_empty()) {
            (true, false) => response.to_string(),
            (true, true) => MSG_NO_AGENT_RESPONSE.to_string(),
            (false, _) => {
                let err = if output.stderr.is_empty() {
                    "Unknown error"
                } else {
                    truncate_chars(&output.stderr, STDERR_PREVIEW_CHARS)
                };
                error!(exit_code = output.exit_code, stderr = err, "cursor agent failed");
                format!("Error: {err}")
            },
        }
    }

    /// Ask the agent for a new chat and persist its id. Any failure means the
    /// call proceeds without one.
    async fn create_chat(&self, program: &str, sender: &str) -> Option<String> {
        let opts = RunOpts::new(CREATE_CHAT_TIMEOUT).with_working_dir(self.working_dir.clone());
        match process::run(program, &create_chat_args(), &opts).await {
            Ok(output) if output.success() => {
                let id = output.stdout.trim();
                if id.is_empty() {
                    warn!("cursor create-chat returned no id");
                    return None;
                }
                debug!(chat_id = id, "created cursor chat");
                self.chats.set(sender, id);
                Some(id.to_string())
            },
            Ok(output) => {
                warn!(exit_code = output.exit_code, "cursor create-chat failed");
                None
            },
            Err(e) => {
                warn!(error = %e, "cursor create-chat failed");
                None
            },
        }
    }
}
