//! Inbound message → backend reply, plus the slash-command surface.

use std::sync::{Arc, Mutex};

use {
    clirelay_backends::{ClaudeCli, CursorAgent, ReplyStream},
    clirelay_common::ChatMessage,
    clirelay_config::RelayConfig,
    clirelay_routing::{Route, decide},
    clirelay_sessions::{
        CHAT_IDS_FILE, HISTORY_FILE, HistoryStore, Role, SESSION_IDS_FILE, TokenStore,
    },
    tokio_stream::StreamExt,
    tracing::info,
};

use crate::messages::{
    HISTORY_MAX_EXCHANGES, MSG_HISTORY_EMPTY, MSG_MODEL_USAGE, MSG_NEW_SESSION, model_set, status,
};

pub struct MessageRouter {
    config: Arc<RelayConfig>,
    claude: ClaudeCli,
    cursor: CursorAgent,
    history: HistoryStore,
    /// Claude model override; `None` uses the CLI default.
    model: Mutex<Option<String>>,
}

impl MessageRouter {
    /// Open the continuity stores under `config.state_dir`.
    pub fn new(config: Arc<RelayConfig>) -> Self {
        let dir = &config.state_dir;
        let sessions = Arc::new(TokenStore::open(dir.join(SESSION_IDS_FILE)));
        let chats = Arc::new(TokenStore::open(dir.join(CHAT_IDS_FILE)));
        let history = HistoryStore::open(dir.join(HISTORY_FILE), HISTORY_MAX_EXCHANGES * 2);
        Self::with_stores(config, sessions, chats, history)
    }

    pub fn with_stores(
        config: Arc<RelayConfig>,
        sessions: Arc<TokenStore>,
        chats: Arc<TokenStore>,
        history: HistoryStore,
    ) -> Self {
        let claude = ClaudeCli::new(
            config.claude_cli_path.clone(),
            config.claude_timeout,
            sessions,
        );
        let cursor = CursorAgent::new(
            config.cursor_cli_path.clone(),
            config.cursor_timeout,
            config.cursor_working_dir.clone(),
            chats,
        );
        Self {
            config,
            claude,
            cursor,
            history,
            model: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn get_model(&self) -> Option<String> {
        self.model.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_model(&self, model: impl Into<String>) {
        *self.model.lock().unwrap_or_else(|e| e.into_inner()) = Some(model.into());
    }

    fn route(&self, content: &str) -> Route {
        decide(
            content,
            &self.config.claude_patterns,
            self.cursor.is_configured(),
        )
    }

    /// Route one message and return the complete reply.
    pub async fn handle(&self, message: &ChatMessage) -> String {
        let route = self.route(&message.content);
        self.history
            .append(&message.sender, Role::You, &message.content);
        info!(backend = route.backend(), "routing message");

        let reply = match route {
            Route::Stateful { text } => {
                let model = self.get_model();
                self.claude
                    .call(&message.sender, &text, model.as_deref())
                    .await
            },
            Route::Agent { text } => self.cursor.call(&message.sender, &text).await,
        };

        self.history.append(&message.sender, Role::Bot, &reply);
        reply
    }

    /// Route one message and stream the reply. The stateful backend yields
    /// growing snapshots; the agent backend yields its reply once. The last
    /// chunk is what lands in history.
    pub fn stream_handle(&self, message: ChatMessage) -> ReplyStream<'_> {
        Box::pin(async_stream::stream! {
            let route = self.route(&message.content);
            self.history.append(&message.sender, Role::You, &message.content);
            info!(backend = route.backend(), streaming = true, "routing message");

            match route {
                Route::Stateful { text } => {
                    let mut last = String::new();
                    let mut chunks = self.claude.stream(message.sender.clone(), text, self.get_model());
                    while let Some(chunk) = chunks.next().await {
                        last.clone_from(&chunk);
                        yield chunk;
                    }
                    self.history.append(&message.sender, Role::Bot, &last);
                },
                Route::Agent { text } => {
                    let reply = self.cursor.call(&message.sender, &text).await;
                    self.history.append(&message.sender, Role::Bot, &reply);
                    yield reply;
                },
            }
        })
    }

    /// `/model <provider> <args>`.
    pub async fn handle_model_command(&self, sender: &str, provider: &str, args: &str) -> String {
        match provider.to_lowercase().as_str() {
            "claude" => {
                let resolved = self.config.resolve_model_alias(args);
                info!(model = %resolved, "claude model override set");
                self.set_model(resolved.clone());
                model_set(&resolved)
            },
            "cursor" => {
                self.cursor
                    .call(sender, &format!("/model {}", args.trim()))
                    .await
            },
            _ => MSG_MODEL_USAGE.to_string(),
        }
    }

    pub fn handle_status_command(&self) -> String {
        let model = self.get_model().unwrap_or_else(|| "default".into());
        let voice = if self.config.voice_enabled() {
            "enabled"
        } else {
            "disabled"
        };
        let cursor = self.cursor.program().unwrap_or("not configured");
        status(&model, voice, cursor)
    }

    pub fn handle_history_command(&self, sender: &str) -> String {
        let entries = self.history.get(sender);
        if entries.is_empty() {
            return MSG_HISTORY_EMPTY.to_string();
        }
        let start = entries.len().saturating_sub(HISTORY_MAX_EXCHANGES * 2);
        let shown = &entries[start..];
        // N counts entries, not exchange pairs.
        let mut lines = vec![format!("Last {} exchanges:\n\n", shown.len())];
        lines.extend(shown.iter().map(|e| format!("{}: {}", e.role, e.content)));
        lines.join("\n")
    }

    /// `/new`: forget the session token, chat token and history.
    pub fn handle_new_command(&self, sender: &str) -> String {
        self.claude.sessions().delete(sender);
        self.cursor.chats().delete(sender);
        self.history.delete(sender);
        info!("session cleared");
        MSG_NEW_SESSION.to_string()
    }
}
