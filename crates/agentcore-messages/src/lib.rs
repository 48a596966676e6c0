//! Message Store (spec.md §4.H): a thin service over `agentcore-store`'s
//! `agent_messages` repository.

use chrono::Utc;

use agentcore_store::Store;
use agentcore_types::{AgentCoreError, AgentMessage, MessageId, MessageRole, MessageStatus, Modality, SessionId, UserId};

pub struct MessageStore<'s> {
    store: &'s Store,
}

impl<'s> MessageStore<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    pub async fn save_user_message(
        &self,
        session_id: SessionId,
        user_id: UserId,
        content: &str,
        modality: Modality,
        idempotency_key: Option<String>,
        trace_id: Option<String>,
    ) -> Result<AgentMessage, AgentCoreError> {
        let now = Utc::now();
        let message = AgentMessage {
            id: MessageId::new(),
            session_id,
            user_id,
            role: MessageRole::User,
            content: content.to_string(),
            modality,
            status: MessageStatus::Completed,
            idempotency_key,
            trace_id,
            created_at: now,
            updated_at: now,
        };
        self.store
            .save_user_message(&message)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))
    }

    pub async fn save_assistant_message(
        &self,
        session_id: SessionId,
        user_id: UserId,
        content: &str,
        modality: Modality,
        trace_id: Option<String>,
    ) -> Result<AgentMessage, AgentCoreError> {
        let now = Utc::now();
        let message = AgentMessage {
            id: MessageId::new(),
            session_id,
            user_id,
            role: MessageRole::Assistant,
            content: content.to_string(),
            modality,
            status: MessageStatus::Completed,
            idempotency_key: None,
            trace_id,
            created_at: now,
            updated_at: now,
        };
        self.store
            .save_assistant_message(&message)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))
    }

    pub async fn recent_messages(
        &self,
        session_id: SessionId,
        limit: usize,
    ) -> Result<Vec<AgentMessage>, AgentCoreError> {
        self.store
            .recent_messages(session_id, limit)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))
    }

    pub async fn assistant_reply_for_trace(
        &self,
        session_id: SessionId,
        trace_id: &str,
    ) -> Result<Option<AgentMessage>, AgentCoreError> {
        self.store
            .assistant_reply_for_trace(session_id, trace_id)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_types::Session;

    #[tokio::test]
    async fn duplicate_idempotency_key_returns_same_message() {
        let store = Store::open_in_memory().unwrap();
        let messages = MessageStore::new(&store);
        let session_id = SessionId::new();
        let user_id = UserId::new();
        store.ensure_user(user_id).await.unwrap();
        store
            .create_session(&Session {
                id: session_id,
                user_id,
                started_at: Utc::now(),
                expires_at: None,
                revoked_at: None,
                scopes_override: None,
            })
            .await
            .unwrap();
        let first = messages
            .save_user_message(session_id, user_id, "hello", Modality::Text, Some("req-1".to_string()), None)
            .await
            .unwrap();
        let second = messages
            .save_user_message(session_id, user_id, "hello again", Modality::Text, Some("req-1".to_string()), None)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.content, "hello");
    }
}
