use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::{ParleyError, ParleyResult};
use crate::models::conversation::Conversation;

/// Persistence for conversation records
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, id: &str) -> ParleyResult<Conversation>;

    async fn insert(&self, conversation: Conversation) -> ParleyResult<()>;

    /// Replace an existing record
    async fn update(&self, conversation: Conversation) -> ParleyResult<()>;

    async fn delete(&self, id: &str) -> ParleyResult<()>;

    /// All conversations, most recently updated first
    async fn list(&self) -> ParleyResult<Vec<Conversation>>;
}

#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, id: &str) -> ParleyResult<Conversation> {
        self.conversations
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ParleyError::not_found("Conversation", id))
    }

    async fn insert(&self, conversation: Conversation) -> ParleyResult<()> {
        let mut conversations = self.conversations.write().await;
        if conversations.contains_key(&conversation.id) {
            return Err(ParleyError::Storage(format!(
                "conversation '{}' already exists",
                conversation.id
            )));
        }
        conversations.insert(conversation.id.clone(), conversation);
        Ok(())
    }

    async fn update(&self, conversation: Conversation) -> ParleyResult<()> {
        let mut conversations = self.conversations.write().await;
        match conversations.get_mut(&conversation.id) {
            Some(existing) => {
                *existing = conversation;
                Ok(())
            }
            None => Err(ParleyError::not_found("Conversation", conversation.id)),
        }
    }

    async fn delete(&self, id: &str) -> ParleyResult<()> {
        self.conversations
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ParleyError::not_found("Conversation", id))
    }

    async fn list(&self) -> ParleyResult<Vec<Conversation>> {
        let mut conversations: Vec<_> = self.conversations.read().await.values().cloned().collect();
        conversations.sort_by(|a, b| b.updated.cmp(&a.updated));
        Ok(conversations)
    }
}
