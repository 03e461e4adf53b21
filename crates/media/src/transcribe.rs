//! Voice note transcription.

use {
    async_trait::async_trait,
    bytes::Bytes,
    reqwest::{
        Client,
        multipart::{Form, Part},
    },
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tracing::debug,
};

use crate::error::{Error, Result};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const WHISPER_MODEL: &str = "whisper-1";
/// Telegram voice notes are OGG/Opus.
const VOICE_FILENAME: &str = "voice.ogg";

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Convert raw audio to trimmed text. Blank transcripts are an error.
    async fn transcribe(&self, audio: Bytes) -> Result<String>;
}

/// OpenAI Whisper over the `audio/transcriptions` endpoint.
#[derive(Clone)]
pub struct WhisperTranscriber {
    client: Client,
    api_key: Secret<String>,
    base_url: String,
}

impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl WhisperTranscriber {
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
struct TranscriptionResponse {
    text: String,
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: Bytes) -> Result<String> {
        debug!(bytes = audio.len(), "whisper transcription request");
        let part = Part::bytes(audio.to_vec())
            .file_name(VOICE_FILENAME)
            .mime_str("audio/ogg")?;
        let form = Form::new()
            .part("file", part)
            .text("model", WHISPER_MODEL);

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                provider: "whisper",
                status,
                body,
            });
        }

        let parsed: TranscriptionResponse = response.json().await?;
        let text = parsed.text.trim();
        if text.is_empty() {
            return Err(Error::EmptyResponse {
                provider: "whisper",
            });
        }
        Ok(text.to_string())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn transcriber(server: &mockito::Server) -> WhisperTranscriber {
        WhisperTranscriber::new(Secret::new("sk-test".into())).with_base_url(server.url())
    }

    #[tokio::test]
    async fn returns_trimmed_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/audio/transcriptions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::Regex("whisper-1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"text": "  hello there \n"}"#)
            .create_async()
            .await;

        let text = transcriber(&server)
            .transcribe(Bytes::from_static(b"OggS fake"))
            .await
            .unwrap();
        assert_eq!(text, "hello there");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_error_carries_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/audio/transcriptions")
            .with_status(401)
            .with_body("bad key")
            .create_async()
            .await;

        let err = transcriber(&server)
            .transcribe(Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("bad key"));
    }

    #[tokio::test]
    async fn blank_transcript_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/audio/transcriptions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"text": "   "}"#)
            .create_async()
            .await;

        let err = transcriber(&server)
            .transcribe(Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyResponse { .. }));
    }

    #[test]
    fn debug_redacts_api_key() {
        let t = WhisperTranscriber::new(Secret::new("super-secret".into()));
        let dbg = format!("{t:?}");
        assert!(dbg.contains("[REDACTED]"));
        assert!(!dbg.contains("super-secret"));
    }
}
