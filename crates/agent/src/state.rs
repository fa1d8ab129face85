use std::collections::HashMap;

use risepal_core::dialogue::ConversationState;
use risepal_core::domain::chat::SessionId;
use tokio::sync::RwLock;

/// Per-session conversation state. The lock is only held for a get or a put.
#[derive(Default)]
pub struct InMemoryConversationStore {
    sessions: RwLock<HashMap<SessionId, ConversationState>>,
}

impl InMemoryConversationStore {
    pub async fn get(&self, session_id: &SessionId) -> Option<ConversationState> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn put(&self, state: ConversationState) {
        self.sessions.write().await.insert(state.session_id.clone(), state);
    }

    pub async fn discard(&self, session_id: &SessionId) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
