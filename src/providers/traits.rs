use async_trait::async_trait;

use super::types::{ByteStream, CompletionRequest, ProviderError};

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Start a streamed completion. Status errors are reported here, before
    /// any body bytes are handed out.
    async fn stream_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<ByteStream, ProviderError>;
}
