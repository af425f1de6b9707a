use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::models::{title_from_message, Conversation, Message, Role};
use crate::providers::{ChatMessage, CompletionProvider, CompletionRequest, ProviderError};
use crate::services::assembler::{consume_stream, MessageAssembler, StreamEnd};
use crate::services::store::ConversationStore;

/// Callbacks for one send. Deltas arrive in the order they were received.
pub trait TurnObserver: Send {
    fn on_delta(&mut self, _messages: &Arc<Vec<Message>>, _delta: &str) {}

    fn on_error(&mut self, _error: &ProviderError) {}

    fn on_complete(&mut self, _content: &str) {}
}

/// Observer for callers that only care about the returned outcome.
pub struct NoopObserver;

impl TurnObserver for NoopObserver {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The assistant reply, possibly empty.
    Completed(String),
    /// Stopped by the caller; holds the partial reply.
    Cancelled(String),
    Failed(ProviderError),
    /// The conversation could not be created, nothing was sent.
    StartFailed,
    /// Blank input.
    Ignored,
}

/// State of one chat window: the visible message list, the conversation
/// list and the conversation being continued.
///
/// Sending borrows the session mutably, so a second send cannot start
/// until the first one has returned.
pub struct ChatSession {
    store: Arc<dyn ConversationStore>,
    provider: Arc<dyn CompletionProvider>,
    messages: watch::Sender<Arc<Vec<Message>>>,
    conversations: Vec<Conversation>,
    current_conversation_id: Option<String>,
}

impl ChatSession {
    pub fn new(store: Arc<dyn ConversationStore>, provider: Arc<dyn CompletionProvider>) -> Self {
        let (messages, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            store,
            provider,
            messages,
            conversations: Vec::new(),
            current_conversation_id: None,
        }
    }

    pub fn messages(&self) -> Arc<Vec<Message>> {
        self.messages.borrow().clone()
    }

    /// Watch the message list. Every update replaces the whole list.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Message>>> {
        self.messages.subscribe()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn current_conversation_id(&self) -> Option<&str> {
        self.current_conversation_id.as_deref()
    }

    pub fn current_conversation(&self) -> Option<&Conversation> {
        let id = self.current_conversation_id.as_deref()?;
        self.conversations.iter().find(|c| c.id == id)
    }

    fn publish(&self, messages: Vec<Message>) -> Arc<Vec<Message>> {
        let messages = Arc::new(messages);
        self.messages.send_replace(messages.clone());
        messages
    }

    pub async fn refresh_conversations(&mut self) -> Result<()> {
        self.conversations = self.store.list_conversations().await?;
        Ok(())
    }

    pub async fn load_conversation(&mut self, conversation_id: &str) -> Result<()> {
        let messages = self.store.list_messages(conversation_id).await?;
        tracing::debug!(
            "Loaded {} messages for conversation {}",
            messages.len(),
            conversation_id
        );
        self.publish(messages);
        self.current_conversation_id = Some(conversation_id.to_string());
        Ok(())
    }

    pub fn new_chat(&mut self) {
        self.current_conversation_id = None;
        self.publish(Vec::new());
    }

    pub async fn delete_conversation(&mut self, conversation_id: &str) -> Result<()> {
        self.store.delete_conversation(conversation_id).await?;

        if self.current_conversation_id.as_deref() == Some(conversation_id) {
            self.new_chat();
        }

        if let Err(e) = self.refresh_conversations().await {
            tracing::error!("Error fetching conversations: {:#}", e);
        }
        Ok(())
    }

    async fn start_conversation(&mut self, first_message: &str) -> Result<String> {
        let conversation = self
            .store
            .create_conversation(&title_from_message(first_message))
            .await?;
        tracing::info!("Created conversation {}", conversation.id);

        let id = conversation.id.clone();
        self.current_conversation_id = Some(id.clone());
        if let Err(e) = self.refresh_conversations().await {
            tracing::error!("Error fetching conversations: {:#}", e);
        }
        Ok(id)
    }

    async fn save_message(&self, conversation_id: &str, role: Role, content: &str) {
        if let Err(e) = self.store.append_message(conversation_id, role, content).await {
            tracing::error!("Error saving message: {:#}", e);
        }
    }

    /// Send one user message and stream the reply into the message list.
    pub async fn send_message<O>(
        &mut self,
        content: &str,
        observer: &mut O,
        cancel: &CancellationToken,
    ) -> SendOutcome
    where
        O: TurnObserver + ?Sized,
    {
        let content = content.trim();
        if content.is_empty() {
            return SendOutcome::Ignored;
        }

        let conversation_id = match self.current_conversation_id.clone() {
            Some(id) => id,
            None => match self.start_conversation(content).await {
                Ok(id) => id,
                Err(e) => {
                    tracing::error!("Error creating conversation: {:#}", e);
                    return SendOutcome::StartFailed;
                }
            },
        };

        let user_message = Message::new(Role::User, content);
        let history = {
            let mut list = self.messages().as_ref().clone();
            list.push(user_message.clone());
            self.publish(list)
        };

        self.save_message(&conversation_id, Role::User, content).await;

        let request = CompletionRequest {
            messages: history
                .iter()
                .map(|m| ChatMessage {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect(),
        };

        let result = match self.provider.stream_completion(&request).await {
            Ok(body) => {
                let mut assembler = MessageAssembler::new();
                let messages = &self.messages;
                let end = consume_stream(body, cancel, |delta| {
                    let next = {
                        let current = messages.borrow();
                        Arc::new(assembler.apply(&current, &delta))
                    };
                    messages.send_replace(next.clone());
                    observer.on_delta(&next, &delta);
                })
                .await;
                end.map(|end| (end, assembler.into_content()))
            }
            Err(e) => Err(e),
        };

        match result {
            Ok((end, reply)) => {
                if !reply.is_empty() {
                    self.save_message(&conversation_id, Role::Assistant, &reply)
                        .await;
                    if let Err(e) = self.refresh_conversations().await {
                        tracing::error!("Error fetching conversations: {:#}", e);
                    }
                }
                match end {
                    StreamEnd::Finished => {
                        observer.on_complete(&reply);
                        SendOutcome::Completed(reply)
                    }
                    StreamEnd::Cancelled => {
                        tracing::info!("Generation stopped after {} bytes", reply.len());
                        SendOutcome::Cancelled(reply)
                    }
                }
            }
            Err(error) => {
                tracing::error!("Chat error: {}", error);
                if matches!(error, ProviderError::RequestFailed(_)) {
                    // Leave any partial reply visible; drop the user message
                    // so it can be sent again.
                    let remaining: Vec<Message> = self
                        .messages()
                        .iter()
                        .filter(|m| m.id != user_message.id)
                        .cloned()
                        .collect();
                    self.publish(remaining);
                }
                observer.on_error(&error);
                SendOutcome::Failed(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::{stream, StreamExt};

    use super::*;
    use crate::providers::ByteStream;
    use crate::services::database::Database;

    enum Scripted {
        Body(Vec<Result<String, ProviderError>>),
        Fail(ProviderError),
        /// A body that never yields a chunk.
        Stall,
    }

    struct ScriptedProvider {
        script: Mutex<Vec<Scripted>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn stream_completion(
            &self,
            request: &CompletionRequest,
        ) -> Result<ByteStream, ProviderError> {
            self.requests.lock().unwrap().push(request.clone());
            match self.script.lock().unwrap().remove(0) {
                Scripted::Body(chunks) => Ok(stream::iter(
                    chunks.into_iter().map(|c| c.map(Bytes::from)),
                )
                .boxed()),
                Scripted::Fail(e) => Err(e),
                Scripted::Stall => Ok(stream::pending::<Result<Bytes, ProviderError>>().boxed()),
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        deltas: Vec<String>,
        snapshots: Vec<Arc<Vec<Message>>>,
        errors: Vec<ProviderError>,
        completed: Vec<String>,
    }

    impl TurnObserver for Recorder {
        fn on_delta(&mut self, messages: &Arc<Vec<Message>>, delta: &str) {
            self.deltas.push(delta.to_string());
            self.snapshots.push(messages.clone());
        }

        fn on_error(&mut self, error: &ProviderError) {
            self.errors.push(error.clone());
        }

        fn on_complete(&mut self, content: &str) {
            self.completed.push(content.to_string());
        }
    }

    fn frame(content: &str) -> Result<String, ProviderError> {
        Ok(format!(
            "data: {}\n",
            serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
        ))
    }

    fn session(provider: Arc<ScriptedProvider>) -> (ChatSession, Arc<Database>) {
        let db = Arc::new(Database::new_in_memory().unwrap());
        (ChatSession::new(db.clone(), provider), db)
    }

    #[tokio::test]
    async fn test_send_streams_and_persists() {
        let provider = ScriptedProvider::new(vec![Scripted::Body(vec![
            frame("Hel"),
            frame("lo"),
            Ok("data: [DONE]\n".to_string()),
        ])]);
        let (mut session, db) = session(provider.clone());
        let mut recorder = Recorder::default();

        let outcome = session
            .send_message("  Hi there  ", &mut recorder, &CancellationToken::new())
            .await;

        assert_eq!(outcome, SendOutcome::Completed("Hello".to_string()));
        assert_eq!(recorder.deltas, vec!["Hel", "lo"]);
        assert_eq!(recorder.completed, vec!["Hello"]);
        assert_eq!(recorder.snapshots[0].last().unwrap().content, "Hel");
        assert_eq!(recorder.snapshots[1].last().unwrap().content, "Hello");

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hi there");
        assert_eq!(messages[1].role, Role::Assistant);

        let conversation_id = session.current_conversation_id().unwrap().to_string();
        let stored = db.list_messages(&conversation_id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].content, "Hello");

        assert_eq!(session.conversations().len(), 1);
        assert_eq!(session.conversations()[0].title, "Hi there");

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].messages.len(), 1);
        assert_eq!(requests[0].messages[0].content, "Hi there");
    }

    #[tokio::test]
    async fn test_follow_up_includes_history() {
        let provider = ScriptedProvider::new(vec![
            Scripted::Body(vec![frame("First")]),
            Scripted::Body(vec![frame("Second")]),
        ]);
        let (mut session, _db) = session(provider.clone());
        let cancel = CancellationToken::new();

        session.send_message("one", &mut NoopObserver, &cancel).await;
        let conversation_id = session.current_conversation_id().map(str::to_string);
        session.send_message("two", &mut NoopObserver, &cancel).await;

        assert_eq!(
            session.current_conversation_id().map(str::to_string),
            conversation_id
        );
        assert_eq!(session.conversations().len(), 1);

        let requests = provider.requests.lock().unwrap();
        let roles: Vec<Role> = requests[1].messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);

        let contents: Vec<String> = session.messages().iter().map(|m| m.content.clone()).collect();
        assert_eq!(contents, vec!["one", "First", "two", "Second"]);
    }

    #[tokio::test]
    async fn test_rate_limit_reports_error_without_deltas() {
        let provider = ScriptedProvider::new(vec![Scripted::Fail(ProviderError::RateLimited)]);
        let (mut session, _db) = session(provider);
        let mut recorder = Recorder::default();

        let outcome = session
            .send_message("hello", &mut recorder, &CancellationToken::new())
            .await;

        assert_eq!(outcome, SendOutcome::Failed(ProviderError::RateLimited));
        assert_eq!(recorder.errors, vec![ProviderError::RateLimited]);
        assert!(recorder.deltas.is_empty());
        assert!(recorder.completed.is_empty());
        assert_eq!(session.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_partial_reply() {
        let provider = ScriptedProvider::new(vec![Scripted::Body(vec![
            frame("partial"),
            Err(ProviderError::RequestFailed("reset".to_string())),
        ])]);
        let (mut session, db) = session(provider);
        let mut recorder = Recorder::default();

        let outcome = session
            .send_message("question", &mut recorder, &CancellationToken::new())
            .await;

        assert!(matches!(outcome, SendOutcome::Failed(ProviderError::RequestFailed(_))));
        let messages = session.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[0].content, "partial");
        assert_eq!(recorder.errors.len(), 1);

        // Only the user message reached the store
        let conversation_id = session.current_conversation_id().unwrap().to_string();
        let stored = db.list_messages(&conversation_id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let provider = ScriptedProvider::new(Vec::new());
        let (mut session, db) = session(provider);

        let outcome = session
            .send_message("   \n", &mut NoopObserver, &CancellationToken::new())
            .await;

        assert_eq!(outcome, SendOutcome::Ignored);
        assert!(session.messages().is_empty());
        assert!(db.list_conversations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_send_emits_nothing() {
        let provider = ScriptedProvider::new(vec![Scripted::Body(vec![frame("never")])]);
        let (mut session, _db) = session(provider);
        let mut recorder = Recorder::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = session.send_message("stop", &mut recorder, &cancel).await;

        assert_eq!(outcome, SendOutcome::Cancelled(String::new()));
        assert!(recorder.deltas.is_empty());
        assert!(recorder.completed.is_empty());
        assert!(recorder.errors.is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_see_whole_list_updates() {
        let provider = ScriptedProvider::new(vec![Scripted::Body(vec![frame("a"), frame("b")])]);
        let (mut session, _db) = session(provider);
        let mut updates = session.subscribe();

        session
            .send_message("go", &mut NoopObserver, &CancellationToken::new())
            .await;

        assert!(updates.has_changed().unwrap());
        let latest = updates.borrow_and_update().clone();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[1].content, "ab");
    }

    #[tokio::test]
    async fn test_dropped_send_leaves_session_usable() {
        let provider = ScriptedProvider::new(vec![
            Scripted::Stall,
            Scripted::Body(vec![frame("Back")]),
        ]);
        let (mut session, _db) = session(provider);

        let stalled = tokio::time::timeout(
            std::time::Duration::from_millis(250),
            session.send_message("first", &mut NoopObserver, &CancellationToken::new()),
        )
        .await;
        assert!(stalled.is_err());

        let outcome = session
            .send_message("second", &mut NoopObserver, &CancellationToken::new())
            .await;
        assert_eq!(outcome, SendOutcome::Completed("Back".to_string()));
        let contents: Vec<String> = session.messages().iter().map(|m| m.content.clone()).collect();
        assert_eq!(contents, vec!["first", "second", "Back"]);
    }

    #[tokio::test]
    async fn test_load_and_delete_conversation() {
        let provider = ScriptedProvider::new(vec![Scripted::Body(vec![frame("Reply")])]);
        let (mut session, _db) = session(provider);

        session
            .send_message("Keep me", &mut NoopObserver, &CancellationToken::new())
            .await;
        let id = session.current_conversation_id().unwrap().to_string();

        session.new_chat();
        assert!(session.messages().is_empty());
        assert!(session.current_conversation_id().is_none());

        session.load_conversation(&id).await.unwrap();
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.current_conversation().unwrap().title, "Keep me");

        session.delete_conversation(&id).await.unwrap();
        assert!(session.messages().is_empty());
        assert!(session.current_conversation_id().is_none());
        assert!(session.conversations().is_empty());
    }
}
