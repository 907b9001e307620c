use async_trait::async_trait;
use promobot_core::Message;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("completion transport failed: {0}")]
    Transport(String),
    #[error("completion endpoint returned status {code}")]
    Status { code: u16 },
    #[error("completion response body was malformed: {0}")]
    MalformedResponse(String),
}

/// Black-box text-generation service: ordered message list in, one text blob
/// out. Callers are responsible for extracting structure (a digit, a first
/// line) from the unstructured response.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError>;
}
