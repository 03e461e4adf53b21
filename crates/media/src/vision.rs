//! Photo analysis through hosted vision models.

use std::sync::Arc;

use {
    async_trait::async_trait,
    base64::{Engine, engine::general_purpose::STANDARD},
    bytes::Bytes,
    reqwest::Client,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    serde_json::json,
    tracing::debug,
};

use crate::error::{Error, Result};

/// Prompt used when a photo arrives without a caption.
pub const DEFAULT_PROMPT: &str = "What do you see in this image? Describe it in detail.";

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const CLAUDE_VISION_MODEL: &str = "claude-opus-4-6";
const CLAUDE_MAX_TOKENS: u32 = 1024;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const OPENAI_VISION_MODEL: &str = "gpt-4o";

#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    /// Describe `image` (JPEG), answering `caption` when given.
    async fn analyze(&self, image: Bytes, caption: Option<&str>) -> Result<String>;
}

fn prompt(caption: Option<&str>) -> &str {
    caption
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_PROMPT)
}

async fn check(provider: &'static str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Api {
        provider,
        status,
        body,
    })
}

/// Anthropic Messages API with a base64 image block.
#[derive(Clone)]
pub struct ClaudeVision {
    client: Client,
    api_key: Secret<String>,
    base_url: String,
}

impl std::fmt::Debug for ClaudeVision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeVision")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ClaudeVision {
    #[must_use]
    pub fn new(api_key: Secret<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: ANTHROPIC_API_BASE.into(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl VisionAnalyzer for ClaudeVision {
    async fn analyze(&self, image: Bytes, caption: Option<&str>) -> Result<String> {
        let body = json!({
            "model": CLAUDE_VISION_MODEL,
            "max_tokens": CLAUDE_MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/jpeg",
                            "data": STANDARD.encode(&image),
                        },
                    },
                    { "type": "text", "text": prompt(caption) },
                ],
            }],
        });
        debug!(bytes = image.len(), model = CLAUDE_VISION_MODEL, "claude vision request");

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;
        let parsed: MessagesResponse = check("claude vision", response).await?.json().await?;

        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(Error::EmptyResponse {
                provider: "claude vision",
            })
    }
}

/// OpenAI chat completions with an inline data URL.
#[derive(Clone)]
pub struct OpenAiVision {
    client: Client,
    api_key: Secret<String>,
    base_url: String,
}

impl std::fmt::Debug for OpenAiVision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiVision")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiVision {
    #[must_use]
    pub fn new(api_key: Secret<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: OPENAI_API_BASE.into(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl VisionAnalyzer for OpenAiVision {
    async fn analyze(&self, image: Bytes, caption: Option<&str>) -> Result<String> {
        let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(&image));
        let body = json!({
            "model": OPENAI_VISION_MODEL,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "image_url", "image_url": { "url": data_url } },
                    { "type": "text", "text": prompt(caption) },
                ],
            }],
        });
        debug!(bytes = image.len(), model = OPENAI_VISION_MODEL, "openai vision request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        let parsed: CompletionResponse = check("openai vision", response).await?.json().await?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(Error::EmptyResponse {
                provider: "openai vision",
            })
    }
}

/// Claude when an Anthropic key is set, else OpenAI, else nothing.
pub fn select_vision(
    anthropic_key: Option<&Secret<String>>,
    openai_key: Option<&Secret<String>>,
) -> Option<Arc<dyn VisionAnalyzer>> {
    if let Some(key) = anthropic_key {
        return Some(Arc::new(ClaudeVision::new(key.clone())));
    }
    openai_key.map(|key| Arc::new(OpenAiVision::new(key.clone())) as Arc<dyn VisionAnalyzer>)
}
