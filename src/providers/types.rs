use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Role;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Rate limited")]
    RateLimited,

    #[error("Quota exceeded")]
    QuotaExceeded,

    #[error("Request failed: {0}")]
    RequestFailed(String),
}

impl ProviderError {
    /// The notification shown to the user for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            ProviderError::RateLimited => {
                "Rate limit exceeded. Please wait a moment and try again."
            }
            ProviderError::QuotaExceeded => {
                "Usage limit reached. Please add credits to continue."
            }
            ProviderError::RequestFailed(_) => "Failed to send message. Please try again.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
}

/// Raw response body, chunk by chunk, as delivered by the transport.
pub type ByteStream = BoxStream<'static, Result<Bytes, ProviderError>>;
