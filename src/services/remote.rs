use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::RemoteStoreConfig;
use crate::models::{Conversation, Message, Role};
use crate::services::store::ConversationStore;

/// Conversation history kept in a managed Postgres backend, reached through
/// its REST interface (`/rest/v1/<table>`).
pub struct RemoteStore {
    client: Client,
    rest_url: Url,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct MessageRow {
    id: String,
    role: String,
    content: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct NewConversation<'a> {
    title: &'a str,
}

#[derive(Debug, Serialize)]
struct NewMessage<'a> {
    conversation_id: &'a str,
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ConversationTouch {
    updated_at: DateTime<Utc>,
}

impl RemoteStore {
    pub fn new(config: &RemoteStoreConfig) -> Result<Self> {
        let mut base = config.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let rest_url = base
            .join("rest/v1/")
            .context("Failed to build REST endpoint URL")?;

        Ok(Self {
            client: Client::new(),
            rest_url,
            api_key: config.api_key.clone(),
        })
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        self.rest_url
            .join(table)
            .with_context(|| format!("Invalid table name: {}", table))
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn check(response: Response, action: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(anyhow!("{} failed: HTTP {}: {}", action, status.as_u16(), body))
    }

    async fn touch_conversation(&self, conversation_id: &str) -> Result<()> {
        let filter = format!("eq.{}", conversation_id);
        let response = self
            .authorize(self.client.patch(self.table_url("conversations")?))
            .query(&[("id", filter.as_str())])
            .json(&ConversationTouch {
                updated_at: Utc::now(),
            })
            .send()
            .await
            .context("Failed to reach conversation store")?;
        Self::check(response, "Updating conversation").await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for RemoteStore {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let response = self
            .authorize(self.client.get(self.table_url("conversations")?))
            .query(&[("select", "*"), ("order", "updated_at.desc")])
            .send()
            .await
            .context("Failed to reach conversation store")?;
        let conversations = Self::check(response, "Fetching conversations")
            .await?
            .json::<Vec<Conversation>>()
            .await
            .context("Invalid conversation list")?;
        Ok(conversations)
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation> {
        let response = self
            .authorize(self.client.post(self.table_url("conversations")?))
            .header("Prefer", "return=representation")
            .json(&NewConversation { title })
            .send()
            .await
            .context("Failed to reach conversation store")?;
        let mut created = Self::check(response, "Creating conversation")
            .await?
            .json::<Vec<Conversation>>()
            .await
            .context("Invalid conversation returned by store")?;
        if created.is_empty() {
            return Err(anyhow!("Store returned no conversation"));
        }
        Ok(created.swap_remove(0))
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        let filter = format!("eq.{}", id);
        let response = self
            .authorize(self.client.delete(self.table_url("conversations")?))
            .query(&[("id", filter.as_str())])
            .send()
            .await
            .context("Failed to reach conversation store")?;
        Self::check(response, "Deleting conversation").await?;
        Ok(())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let filter = format!("eq.{}", conversation_id);
        let response = self
            .authorize(self.client.get(self.table_url("messages")?))
            .query(&[
                ("select", "*"),
                ("conversation_id", filter.as_str()),
                ("order", "created_at.asc"),
            ])
            .send()
            .await
            .context("Failed to reach conversation store")?;
        let rows = Self::check(response, "Loading messages")
            .await?
            .json::<Vec<MessageRow>>()
            .await
            .context("Invalid message list")?;

        rows.into_iter()
            .map(|row| {
                Ok(Message {
                    role: Role::from_str(&row.role)
                        .ok_or_else(|| anyhow!("Unknown role: {}", row.role))?,
                    id: row.id,
                    content: row.content,
                    timestamp: row.created_at,
                })
            })
            .collect()
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<()> {
        let response = self
            .authorize(self.client.post(self.table_url("messages")?))
            .json(&NewMessage {
                conversation_id,
                role: role.as_str(),
                content,
            })
            .send()
            .await
            .context("Failed to reach conversation store")?;
        Self::check(response, "Saving message").await?;

        if let Err(e) = self.touch_conversation(conversation_id).await {
            tracing::warn!("Failed to bump conversation timestamp: {:#}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(base: &str) -> RemoteStore {
        RemoteStore::new(&RemoteStoreConfig {
            base_url: Url::parse(base).unwrap(),
            api_key: "anon".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_table_urls() {
        let plain = store("https://project.example.co");
        assert_eq!(
            plain.table_url("messages").unwrap().as_str(),
            "https://project.example.co/rest/v1/messages"
        );

        let prefixed = store("https://example.com/db");
        assert_eq!(
            prefixed.table_url("conversations").unwrap().as_str(),
            "https://example.com/db/rest/v1/conversations"
        );
    }
}
