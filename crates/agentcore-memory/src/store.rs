use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};

use agentcore_redact::{redact, redact_text};
use agentcore_store::Store;
use agentcore_types::{
    AgentCoreError, Environment, Memory, MemoryEvent, MemoryEventType, MemoryId, MemoryType,
    ScoredMemory, SessionId, UserId,
};

use crate::config::MemoryStoreConfig;
use crate::embedding::EmbeddingProvider;
use crate::vector::VectorIndex;

fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(digest)
}

/// Every key/value pair in `filter` must be present and equal in `metadata`.
fn metadata_superset(metadata: &Value, filter: &Value) -> bool {
    match (metadata, filter) {
        (Value::Object(m), Value::Object(f)) => {
            f.iter().all(|(k, v)| m.get(k).map(|mv| mv == v).unwrap_or(false))
        }
        _ => false,
    }
}

/// Vector-indexed, user-scoped semantic memory (spec.md §4.B).
pub struct MemoryStore {
    store: Arc<Store>,
    embedding: Box<dyn EmbeddingProvider>,
    vector: Box<dyn VectorIndex>,
    config: MemoryStoreConfig,
    environment: Environment,
}

impl MemoryStore {
    pub fn new(
        store: Arc<Store>,
        embedding: Box<dyn EmbeddingProvider>,
        vector: Box<dyn VectorIndex>,
        config: MemoryStoreConfig,
        environment: Environment,
    ) -> Self {
        Self {
            store,
            embedding,
            vector,
            config,
            environment,
        }
    }

    /// Redacts `content`/`metadata`, dedupes on `(user_id, content_hash)`,
    /// otherwise embeds and inserts. Both paths are a single logical write
    /// followed by one audit event (spec.md §4.B).
    pub async fn write(
        &self,
        user_id: UserId,
        session_id: Option<SessionId>,
        r#type: MemoryType,
        source: &str,
        content: &str,
        metadata: Value,
        retention_days: Option<i64>,
    ) -> Result<MemoryId, AgentCoreError> {
        let content = redact_text(content);
        let metadata = redact(&metadata).value;
        let hash = content_hash(&content);
        let now = Utc::now();

        if let Some(existing) = self
            .store
            .find_live_memory_by_hash(user_id, &hash)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?
        {
            let mut merged_metadata = existing.metadata.clone();
            if let (Value::Object(base), Value::Object(incoming)) =
                (&mut merged_metadata, &metadata)
            {
                for (k, v) in incoming {
                    base.insert(k.clone(), v.clone());
                }
            }
            let expires_at = match retention_days {
                Some(days) => Some(now + chrono::Duration::days(days)),
                None => existing.expires_at,
            };
            self.store
                .update_memory(
                    existing.id,
                    &existing.content,
                    &existing.content_hash,
                    &existing.embedding,
                    &merged_metadata,
                    expires_at,
                    now,
                )
                .await
                .map_err(|e| AgentCoreError::Store(e.to_string()))?;
            self.emit_event(user_id, existing.id, MemoryEventType::Updated, source, None)
                .await?;
            return Ok(existing.id);
        }

        let embedding = self.embedding.embed(&content).await?;
        let expires_at = retention_days.map(|days| now + chrono::Duration::days(days));
        let memory = Memory {
            id: MemoryId::new(),
            user_id,
            session_id,
            r#type,
            source: source.to_string(),
            content,
            content_hash: hash,
            embedding,
            metadata,
            is_deleted: false,
            created_at: now,
            updated_at: now,
            expires_at,
        };

        match self.store.insert_memory(&memory).await {
            Ok(()) => {
                self.emit_event(user_id, memory.id, MemoryEventType::Created, source, None)
                    .await?;
                Ok(memory.id)
            }
            Err(e) if matches!(e, agentcore_store::StoreError::UniqueViolation(_)) => {
                // Lost the insert race; the winner's row is now live. Retry
                // as a read-merge instead of failing the caller.
                let existing = self
                    .store
                    .find_live_memory_by_hash(user_id, &memory.content_hash)
                    .await
                    .map_err(|e| AgentCoreError::Store(e.to_string()))?
                    .ok_or_else(|| {
                        AgentCoreError::Internal(
                            "unique violation but no live row found on retry".to_string(),
                        )
                    })?;
                self.emit_event(user_id, existing.id, MemoryEventType::Updated, source, None)
                    .await?;
                Ok(existing.id)
            }
            Err(e) => Err(AgentCoreError::Store(e.to_string())),
        }
    }

    /// Embeds `query` and ranks live, unexpired memories by cosine
    /// similarity; in `Environment::Test`, skips the embedding/vector step
    /// entirely and returns the most recent matches with `score = 1.0`
    /// (SPEC_FULL.md 4.B, resolves Open Question #1).
    pub async fn retrieve(
        &self,
        user_id: UserId,
        query: &str,
        types: Option<&[MemoryType]>,
        metadata_filter: Option<&Value>,
        top_k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<ScoredMemory>, AgentCoreError> {
        let now = Utc::now();
        let min_score = min_score.unwrap_or(self.config.default_min_score);

        let mut results = if self.environment == Environment::Test {
            let candidates = self
                .store
                .recent_memory_candidates(user_id, types, now, top_k.saturating_mul(4).max(top_k))
                .await
                .map_err(|e| AgentCoreError::Store(e.to_string()))?;
            candidates
                .into_iter()
                .map(|memory| ScoredMemory { memory, score: 1.0 })
                .collect::<Vec<_>>()
        } else {
            let query = redact_text(query);
            let embedding = self.embedding.embed(&query).await?;
            self.vector
                .cosine_search(user_id, &embedding, types, top_k.saturating_mul(4).max(top_k), min_score, now)
                .await?
        };

        if let Some(filter) = metadata_filter {
            results.retain(|m| metadata_superset(&m.memory.metadata, filter));
        }
        results.truncate(top_k);

        for scored in &results {
            self.emit_event(user_id, scored.memory.id, MemoryEventType::Retrieved, "memory_store", None)
                .await?;
        }

        Ok(results)
    }

    /// Rewrites content; re-embeds and re-hashes since the content changed.
    pub async fn update(
        &self,
        user_id: UserId,
        id: MemoryId,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<(), AgentCoreError> {
        let existing = self
            .store
            .get_memory(id)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?
            .ok_or_else(|| AgentCoreError::NotFound(format!("memory {id}")))?;
        if existing.is_deleted {
            return Err(AgentCoreError::NotFound(format!("memory {id}")));
        }

        let content = redact_text(content);
        let hash = content_hash(&content);
        let metadata = match metadata {
            Some(m) => redact(&m).value,
            None => existing.metadata,
        };
        let embedding = self.embedding.embed(&content).await?;
        let now = Utc::now();

        self.store
            .update_memory(id, &content, &hash, &embedding, &metadata, existing.expires_at, now)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?;
        self.emit_event(user_id, id, MemoryEventType::Updated, "memory_store", None)
            .await
    }

    pub async fn soft_delete(&self, user_id: UserId, id: MemoryId) -> Result<(), AgentCoreError> {
        self.store
            .soft_delete_memory(id, Utc::now())
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?;
        self.emit_event(user_id, id, MemoryEventType::Deleted, "memory_store", None)
            .await
    }

    pub async fn get(&self, id: MemoryId) -> Result<Option<Memory>, AgentCoreError> {
        self.store
            .get_memory(id)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))
    }

    pub async fn list(
        &self,
        user_id: UserId,
        r#type: Option<MemoryType>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Memory>, AgentCoreError> {
        self.store
            .list_memories(user_id, r#type, limit, offset)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))
    }

    async fn emit_event(
        &self,
        user_id: UserId,
        memory_id: MemoryId,
        event_type: MemoryEventType,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<(), AgentCoreError> {
        let event = MemoryEvent {
            id: agentcore_types::MemoryEventId::new(),
            user_id,
            memory_id,
            event_type,
            actor: actor.to_string(),
            reason: reason.map(str::to_string),
            created_at: Utc::now(),
        };
        self.store
            .record_memory_event(&event)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::LocalEmbeddingProvider;
    use crate::vector::SqliteVectorIndex;

    fn harness() -> (Arc<Store>, MemoryStore) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let embedding: Box<dyn EmbeddingProvider> = Box::new(LocalEmbeddingProvider::new(32));
        let vector: Box<dyn VectorIndex> = Box::new(SqliteVectorIndex::new(store.clone()));
        let mem_store = MemoryStore::new(
            store.clone(),
            embedding,
            vector,
            MemoryStoreConfig::default(),
            Environment::Production,
        );
        (store, mem_store)
    }

    #[tokio::test]
    async fn write_dedupes_on_content_hash() {
        let (_store, mem) = harness();
        let user = UserId::new();
        let id1 = mem
            .write(user, None, MemoryType::Fact, "test", "the sky is blue", serde_json::json!({}), None)
            .await
            .unwrap();
        let id2 = mem
            .write(user, None, MemoryType::Fact, "test", "the sky is blue", serde_json::json!({"k": "v"}), None)
            .await
            .unwrap();
        assert_eq!(id1, id2);
        let memory = mem.get(id1).await.unwrap().unwrap();
        assert_eq!(memory.metadata["k"], "v");
    }

    #[tokio::test]
    async fn retrieve_orders_by_similarity_and_respects_top_k() {
        let (_store, mem) = harness();
        let user = UserId::new();
        mem.write(user, None, MemoryType::Fact, "test", "the sky is blue", serde_json::json!({}), None)
            .await
            .unwrap();
        mem.write(user, None, MemoryType::Fact, "test", "bananas are yellow", serde_json::json!({}), None)
            .await
            .unwrap();
        let results = mem
            .retrieve(user, "the sky is blue", None, None, 1, Some(0.0))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory.content, "the sky is blue");
    }

    #[tokio::test]
    async fn soft_delete_excludes_from_retrieve() {
        let (_store, mem) = harness();
        let user = UserId::new();
        let id = mem
            .write(user, None, MemoryType::Note, "test", "delete me", serde_json::json!({}), None)
            .await
            .unwrap();
        mem.soft_delete(user, id).await.unwrap();
        let results = mem.retrieve(user, "delete me", None, None, 5, Some(0.0)).await.unwrap();
        assert!(results.is_empty());
    }
}
