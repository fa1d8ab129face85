use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use risepal_core::domain::chat::{ChatMessage, NewChatMessage, SessionId};

use super::{ChatMessageRepository, RepositoryError};

/// Process-local chat log for offline runs and tests.
#[derive(Default)]
pub struct InMemoryChatMessageRepository {
    messages: RwLock<HashMap<SessionId, Vec<ChatMessage>>>,
    next_id: RwLock<i64>,
}

impl InMemoryChatMessageRepository {
    pub async fn all(&self, session_id: &SessionId) -> Vec<ChatMessage> {
        self.messages.read().await.get(session_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChatMessageRepository for InMemoryChatMessageRepository {
    async fn append(&self, message: NewChatMessage) -> Result<ChatMessage, RepositoryError> {
        let id = {
            let mut next_id = self.next_id.write().await;
            *next_id += 1;
            *next_id
        };
        let stored = ChatMessage {
            id,
            session_id: message.session_id,
            user_id: message.user_id,
            sender: message.sender,
            message: message.message,
            timestamp: message.timestamp,
        };
        self.messages
            .write()
            .await
            .entry(stored.session_id.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn recent(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let history = messages.get(session_id).map(Vec::as_slice).unwrap_or_default();
        let skip = history.len().saturating_sub(limit as usize);
        Ok(history[skip..].to_vec())
    }
}
