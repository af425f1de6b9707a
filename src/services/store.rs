use async_trait::async_trait;
use anyhow::Result;

use crate::models::{Conversation, Message, Role};

/// Persistence for conversations and their messages.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// All conversations, most recently updated first.
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;

    async fn create_conversation(&self, title: &str) -> Result<Conversation>;

    /// Deletes the conversation and all of its messages.
    async fn delete_conversation(&self, id: &str) -> Result<()>;

    /// Messages of one conversation, oldest first.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// Appends a message and bumps the conversation's `updated_at`.
    async fn append_message(&self, conversation_id: &str, role: Role, content: &str)
        -> Result<()>;
}
