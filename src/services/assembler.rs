use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::models::{Message, Role};
use crate::providers::{ByteStream, ProviderError, StreamDecoder};

/// Folds streamed deltas into the in-progress assistant message.
///
/// Lists are never edited in place: every delta produces a new list in
/// which the assistant message is either replaced or appended.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    content: String,
    message_id: Option<String>,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_content(self) -> String {
        self.content
    }

    pub fn apply(&mut self, messages: &[Message], delta: &str) -> Vec<Message> {
        self.content.push_str(delta);

        let mut next = messages.to_vec();
        match (next.last_mut(), self.message_id.as_deref()) {
            (Some(last), Some(id)) if last.id == id && last.role == Role::Assistant => {
                last.content.clone_from(&self.content);
            }
            _ => {
                let message = Message::new(Role::Assistant, self.content.clone());
                self.message_id = Some(message.id.clone());
                next.push(message);
            }
        }
        next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The body ended or sent the `[DONE]` sentinel.
    Finished,
    Cancelled,
}

/// Read a response body to the end, handing each delta to `on_delta` in
/// receipt order. Cancellation is checked before every chunk read; once it
/// fires the body is dropped and `on_delta` is not called again.
pub async fn consume_stream<F>(
    mut body: ByteStream,
    cancel: &CancellationToken,
    mut on_delta: F,
) -> Result<StreamEnd, ProviderError>
where
    F: FnMut(String),
{
    let mut decoder = StreamDecoder::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Stream cancelled by caller");
                return Ok(StreamEnd::Cancelled);
            }
            next = body.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                for delta in decoder.push(&chunk) {
                    on_delta(delta);
                }
                if decoder.is_done() {
                    break;
                }
            }
            Some(Err(e)) => {
                tracing::warn!("Stream interrupted: {}", e);
                return Err(e);
            }
            None => {
                for delta in decoder.finish() {
                    on_delta(delta);
                }
                break;
            }
        }
    }

    if decoder.malformed_frames() > 0 {
        tracing::warn!(
            "Skipped {} malformed stream frames",
            decoder.malformed_frames()
        );
    }

    Ok(StreamEnd::Finished)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures::stream;

    use super::*;

    fn body(chunks: Vec<Result<&'static str, ProviderError>>) -> ByteStream {
        stream::iter(
            chunks
                .into_iter()
                .map(|chunk| chunk.map(|text| Bytes::from_static(text.as_bytes()))),
        )
        .boxed()
    }

    #[test]
    fn test_first_delta_appends_assistant_message() {
        let history = vec![Message::new(Role::User, "Hi")];
        let mut assembler = MessageAssembler::new();

        let next = assembler.apply(&history, "Hel");
        assert_eq!(history.len(), 1);
        assert_eq!(next.len(), 2);
        assert_eq!(next[1].role, Role::Assistant);
        assert_eq!(next[1].content, "Hel");

        let after = assembler.apply(&next, "lo");
        assert_eq!(after.len(), 2);
        assert_eq!(after[1].id, next[1].id);
        assert_eq!(after[1].content, "Hello");
        assert_eq!(next[1].content, "Hel");
        assert_eq!(assembler.content(), "Hello");
    }

    #[test]
    fn test_previous_assistant_reply_is_not_overwritten() {
        let history = vec![
            Message::new(Role::User, "One"),
            Message::new(Role::Assistant, "Earlier answer"),
        ];
        let mut assembler = MessageAssembler::new();

        let next = assembler.apply(&history, "New");
        assert_eq!(next.len(), 3);
        assert_eq!(next[1].content, "Earlier answer");
        assert_eq!(next[2].content, "New");
    }

    #[tokio::test]
    async fn test_consume_collects_deltas_in_order() {
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();
        let end = consume_stream(
            body(vec![
                Ok("data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n"),
                Ok("data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n"),
                Ok("data: [DONE]\n"),
            ]),
            &cancel,
            |delta| seen.push(delta),
        )
        .await
        .unwrap();

        assert_eq!(end, StreamEnd::Finished);
        assert_eq!(seen, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_consume_flushes_residual_on_close() {
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();
        consume_stream(
            body(vec![Ok("data: {\"choices\":[{\"delta\":{\"content\":\"end\"}}]}")]),
            &cancel,
            |delta| seen.push(delta),
        )
        .await
        .unwrap();
        assert_eq!(seen, vec!["end"]);
    }

    #[tokio::test]
    async fn test_consume_propagates_transport_error() {
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();
        let result = consume_stream(
            body(vec![
                Ok("data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n"),
                Err(ProviderError::RequestFailed("connection reset".to_string())),
            ]),
            &cancel,
            |delta| seen.push(delta),
        )
        .await;

        assert_eq!(
            result,
            Err(ProviderError::RequestFailed("connection reset".to_string()))
        );
        assert_eq!(seen, vec!["partial"]);
    }

    #[tokio::test]
    async fn test_consume_stops_when_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut calls = 0;
        let end = consume_stream(
            body(vec![Ok("data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n")]),
            &cancel,
            |_| calls += 1,
        )
        .await
        .unwrap();

        assert_eq!(end, StreamEnd::Cancelled);
        assert_eq!(calls, 0);
    }
}
