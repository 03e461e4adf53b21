use std::sync::Arc;

use {
    clirelay_chat::{MessageGate, MessageRouter},
    clirelay_media::{Transcriber, VisionAnalyzer},
    clirelay_sessions::{PROCESSED_FILE, ProcessedMessageStore},
};

/// Everything the update handlers need, shared by the polling task.
pub struct RelayState {
    pub router: MessageRouter,
    pub gate: MessageGate,
    /// Last handled Telegram message id per sender, for redelivery dedup.
    pub processed: ProcessedMessageStore,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub vision: Option<Arc<dyn VisionAnalyzer>>,
    pub stream_responses: bool,
}

impl RelayState {
    /// Gate and dedup store derived from the router's config. Media
    /// collaborators start unset.
    pub fn new(router: MessageRouter) -> Self {
        let config = router.config();
        let gate = MessageGate::new(config.allowed_chat_id.clone());
        let processed = ProcessedMessageStore::open(config.state_dir.join(PROCESSED_FILE));
        let stream_responses = config.stream_responses;
        Self {
            router,
            gate,
            processed,
            transcriber: None,
            vision: None,
            stream_responses,
        }
    }

    #[must_use]
    pub fn with_transcriber(mut self, transcriber: Option<Arc<dyn Transcriber>>) -> Self {
        self.transcriber = transcriber;
        self
    }

    #[must_use]
    pub fn with_vision(mut self, vision: Option<Arc<dyn VisionAnalyzer>>) -> Self {
        self.vision = vision;
        self
    }

    #[must_use]
    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.stream_responses = enabled;
        self
    }
}
