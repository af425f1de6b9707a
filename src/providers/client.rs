use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, StatusCode};
use url::Url;

use super::models::ErrorResponse;
use super::traits::CompletionProvider;
use super::types::{ByteStream, CompletionRequest, ProviderError};

/// Client for a hosted completion endpoint that answers with a
/// `data: <json>` line stream.
pub struct HttpCompletionProvider {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl HttpCompletionProvider {
    pub fn new(endpoint: Url, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key: api_key.into(),
        }
    }

    fn build_auth_header(api_key: &str) -> Option<String> {
        if api_key.is_empty() {
            None
        } else {
            Some(format!("Bearer {}", api_key))
        }
    }

    fn parse_error_message(status: StatusCode, body: &str) -> String {
        if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
            return format!("HTTP {}: {}", status.as_u16(), parsed.message());
        }
        format!("HTTP {}: Request failed", status.as_u16())
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn stream_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<ByteStream, ProviderError> {
        tracing::debug!(
            "Requesting completion from {} with {} messages",
            self.endpoint,
            request.messages.len()
        );

        let mut req = self
            .client
            .post(self.endpoint.clone())
            .header("content-type", "application/json")
            .json(request);

        if let Some(auth) = Self::build_auth_header(&self.api_key) {
            req = req.header("Authorization", auth);
        }

        let response = req.send().await.map_err(|e| {
            ProviderError::RequestFailed(format!(
                "Failed to connect to {}: {}",
                self.endpoint, e
            ))
        })?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }

        if status == StatusCode::PAYMENT_REQUIRED {
            return Err(ProviderError::QuotaExceeded);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed(Self::parse_error_message(
                status, &body,
            )));
        }

        if status == StatusCode::NO_CONTENT
            || status == StatusCode::RESET_CONTENT
            || response.content_length() == Some(0)
        {
            return Err(ProviderError::RequestFailed(
                "No response body".to_string(),
            ));
        }

        let body = response
            .bytes_stream()
            .map_err(|e| ProviderError::RequestFailed(format!("Stream error: {}", e)))
            .boxed();

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_header_skipped_for_empty_key() {
        assert_eq!(HttpCompletionProvider::build_auth_header(""), None);
        assert_eq!(
            HttpCompletionProvider::build_auth_header("abc").as_deref(),
            Some("Bearer abc")
        );
    }

    #[test]
    fn test_error_message_formats() {
        let detailed = HttpCompletionProvider::parse_error_message(
            StatusCode::BAD_GATEWAY,
            r#"{"error":{"message":"upstream down"}}"#,
        );
        assert_eq!(detailed, "HTTP 502: upstream down");

        let plain = HttpCompletionProvider::parse_error_message(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":"AI gateway error"}"#,
        );
        assert_eq!(plain, "HTTP 500: AI gateway error");

        let opaque =
            HttpCompletionProvider::parse_error_message(StatusCode::BAD_REQUEST, "<html>");
        assert_eq!(opaque, "HTTP 400: Request failed");
    }
}
