//! Speech-to-text and image analysis used to turn voice notes and photos into
//! plain text before routing.

pub mod error;
pub mod transcribe;
pub mod vision;

pub use {
    error::{Error, Result},
    transcribe::{Transcriber, WhisperTranscriber},
    vision::{ClaudeVision, OpenAiVision, VisionAnalyzer, select_vision},
};
