use agentcore_types::{Memory, MemoryEvent, MemoryEventType, MemoryId, MemoryType, UserId};
use rusqlite::{params, OptionalExtension};

use crate::util::{parse_json, parse_opt_ts, parse_ts, ts, EmbeddingBlob};
use crate::{Store, StoreError};

fn event_type_str(t: MemoryEventType) -> &'static str {
    use MemoryEventType::*;
    match t {
        Created => "CREATED",
        Updated => "UPDATED",
        Deleted => "DELETED",
        Retrieved => "RETRIEVED",
        Expired => "EXPIRED",
    }
}

fn type_str(t: MemoryType) -> &'static str {
    use MemoryType::*;
    match t {
        Fact => "FACT",
        Preference => "PREFERENCE",
        Task => "TASK",
        Summary => "SUMMARY",
        Contact => "CONTACT",
        Project => "PROJECT",
        Note => "NOTE",
        Document => "DOCUMENT",
    }
}

fn parse_type(s: &str) -> Result<MemoryType, StoreError> {
    use MemoryType::*;
    Ok(match s {
        "FACT" => Fact,
        "PREFERENCE" => Preference,
        "TASK" => Task,
        "SUMMARY" => Summary,
        "CONTACT" => Contact,
        "PROJECT" => Project,
        "NOTE" => Note,
        "DOCUMENT" => Document,
        other => return Err(StoreError::Serialization(format!("bad memory type {other}"))),
    })
}

const COLUMNS: &str = "id, user_id, session_id, type, source, content, content_hash, embedding, metadata, is_deleted, created_at, updated_at, expires_at";

fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<RawMemory> {
    Ok(RawMemory {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_id: row.get(2)?,
        r#type: row.get(3)?,
        source: row.get(4)?,
        content: row.get(5)?,
        content_hash: row.get(6)?,
        embedding: row.get::<_, EmbeddingBlob>(7)?.0,
        metadata: row.get(8)?,
        is_deleted: row.get::<_, i64>(9)? != 0,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        expires_at: row.get(12)?,
    })
}

struct RawMemory {
    id: String,
    user_id: String,
    session_id: Option<String>,
    r#type: String,
    source: String,
    content: String,
    content_hash: String,
    embedding: Vec<f32>,
    metadata: String,
    is_deleted: bool,
    created_at: String,
    updated_at: String,
    expires_at: Option<String>,
}

impl RawMemory {
    fn into_memory(self) -> Result<Memory, StoreError> {
        Ok(Memory {
            id: self.id.parse().map_err(|_| StoreError::Serialization("bad id".into()))?,
            user_id: self
                .user_id
                .parse()
                .map_err(|_| StoreError::Serialization("bad user id".into()))?,
            session_id: self
                .session_id
                .map(|s| s.parse())
                .transpose()
                .map_err(|_| StoreError::Serialization("bad session id".into()))?,
            r#type: parse_type(&self.r#type)?,
            source: self.source,
            content: self.content,
            content_hash: self.content_hash,
            embedding: self.embedding,
            metadata: parse_json(&self.metadata)?,
            is_deleted: self.is_deleted,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            expires_at: parse_opt_ts(self.expires_at)?,
        })
    }
}

impl Store {
    pub async fn find_live_memory_by_hash(
        &self,
        user_id: UserId,
        content_hash: &str,
    ) -> Result<Option<Memory>, StoreError> {
        let conn = self.conn.lock().await;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM memories
                     WHERE user_id = ?1 AND content_hash = ?2 AND is_deleted = 0"
                ),
                params![user_id.to_string(), content_hash],
                row_to_memory,
            )
            .optional()?;
        raw.map(RawMemory::into_memory).transpose()
    }

    pub async fn insert_memory(&self, memory: &Memory) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "INSERT INTO memories ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ),
            params![
                memory.id.to_string(),
                memory.user_id.to_string(),
                memory.session_id.map(|s| s.to_string()),
                type_str(memory.r#type),
                memory.source,
                memory.content,
                memory.content_hash,
                EmbeddingBlob(memory.embedding.clone()),
                memory.metadata.to_string(),
                memory.is_deleted as i64,
                ts(memory.created_at),
                ts(memory.updated_at),
                memory.expires_at.map(ts),
            ],
        )?;
        Ok(())
    }

    /// Rewrites content/hash/embedding/metadata/expiry in place, used both by
    /// the dedup-merge path of `write()` and by `update()`'s re-embed path.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_memory(
        &self,
        id: MemoryId,
        content: &str,
        content_hash: &str,
        embedding: &[f32],
        metadata: &serde_json::Value,
        expires_at: Option<chrono::DateTime<chrono::Utc>>,
        updated_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE memories
             SET content = ?1, content_hash = ?2, embedding = ?3, metadata = ?4,
                 expires_at = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                content,
                content_hash,
                EmbeddingBlob(embedding.to_vec()),
                metadata.to_string(),
                expires_at.map(ts),
                ts(updated_at),
                id.to_string(),
            ],
        )?;
        Ok(())
    }

    pub async fn soft_delete_memory(
        &self,
        id: MemoryId,
        updated_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE memories SET is_deleted = 1, updated_at = ?1 WHERE id = ?2",
            params![ts(updated_at), id.to_string()],
        )?;
        Ok(())
    }

    pub async fn get_memory(&self, id: MemoryId) -> Result<Option<Memory>, StoreError> {
        let conn = self.conn.lock().await;
        let raw = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM memories WHERE id = ?1"),
                params![id.to_string()],
                row_to_memory,
            )
            .optional()?;
        raw.map(RawMemory::into_memory).transpose()
    }

    /// All live (not soft-deleted, not expired), non-type-filtered or
    /// type-filtered candidates for a user. Metadata filtering and cosine
    /// ranking happen in the memory crate, since SQLite here has no vector
    /// or JSON-containment index.
    pub async fn live_memory_candidates(
        &self,
        user_id: UserId,
        types: Option<&[MemoryType]>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Memory>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM memories
             WHERE user_id = ?1 AND is_deleted = 0
               AND (expires_at IS NULL OR expires_at > ?2)"
        ))?;
        let rows = stmt
            .query_map(params![user_id.to_string(), ts(now)], row_to_memory)?
            .collect::<Result<Vec<_>, _>>()?;
        let memories = rows
            .into_iter()
            .map(RawMemory::into_memory)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(match types {
            Some(types) => memories
                .into_iter()
                .filter(|m| types.contains(&m.r#type))
                .collect(),
            None => memories,
        })
    }

    /// Same candidate set but ordered by recency — the test-environment
    /// retrieval fallback (SPEC_FULL.md 4.B).
    pub async fn recent_memory_candidates(
        &self,
        user_id: UserId,
        types: Option<&[MemoryType]>,
        now: chrono::DateTime<chrono::Utc>,
        limit: usize,
    ) -> Result<Vec<Memory>, StoreError> {
        let mut memories = self.live_memory_candidates(user_id, types, now).await?;
        memories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        memories.truncate(limit);
        Ok(memories)
    }

    pub async fn list_memories(
        &self,
        user_id: UserId,
        r#type: Option<MemoryType>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Memory>, StoreError> {
        let conn = self.conn.lock().await;
        let rows = match r#type {
            Some(t) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM memories
                     WHERE user_id = ?1 AND is_deleted = 0 AND type = ?2
                     ORDER BY created_at DESC LIMIT ?3 OFFSET ?4"
                ))?;
                stmt.query_map(
                    params![user_id.to_string(), type_str(t), limit as i64, offset as i64],
                    row_to_memory,
                )?
                .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM memories
                     WHERE user_id = ?1 AND is_deleted = 0
                     ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
                ))?;
                stmt.query_map(
                    params![user_id.to_string(), limit as i64, offset as i64],
                    row_to_memory,
                )?
                .collect::<Result<Vec<_>, _>>()?
            }
        };
        rows.into_iter().map(RawMemory::into_memory).collect()
    }

    /// Appends one audit row to `memory_events`. Never read back inline in the
    /// Memory Store's own write/retrieve path; queried only for audit review.
    pub async fn record_memory_event(&self, event: &MemoryEvent) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO memory_events (id, user_id, memory_id, event_type, actor, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.id.to_string(),
                event.user_id.to_string(),
                event.memory_id.to_string(),
                event_type_str(event.event_type),
                event.actor,
                event.reason,
                ts(event.created_at),
            ],
        )?;
        Ok(())
    }

    /// Audit trail for one memory, oldest first — used to verify the dedup
    /// law's CREATED/UPDATED event sequence.
    pub async fn events_for_memory(
        &self,
        memory_id: MemoryId,
    ) -> Result<Vec<MemoryEvent>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, memory_id, event_type, actor, reason, created_at
             FROM memory_events WHERE memory_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![memory_id.to_string()], |row| {
                Ok(RawEvent {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    memory_id: row.get(2)?,
                    event_type: row.get(3)?,
                    actor: row.get(4)?,
                    reason: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawEvent::into_event).collect()
    }
}

struct RawEvent {
    id: String,
    user_id: String,
    memory_id: String,
    event_type: String,
    actor: String,
    reason: Option<String>,
    created_at: String,
}

fn parse_event_type(s: &str) -> Result<MemoryEventType, StoreError> {
    use MemoryEventType::*;
    Ok(match s {
        "CREATED" => Created,
        "UPDATED" => Updated,
        "DELETED" => Deleted,
        "RETRIEVED" => Retrieved,
        "EXPIRED" => Expired,
        other => return Err(StoreError::Serialization(format!("bad memory event type {other}"))),
    })
}

impl RawEvent {
    fn into_event(self) -> Result<MemoryEvent, StoreError> {
        Ok(MemoryEvent {
            id: self.id.parse().map_err(|_| StoreError::Serialization("bad id".into()))?,
            user_id: self
                .user_id
                .parse()
                .map_err(|_| StoreError::Serialization("bad user id".into()))?,
            memory_id: self
                .memory_id
                .parse()
                .map_err(|_| StoreError::Serialization("bad memory id".into()))?,
            event_type: parse_event_type(&self.event_type)?,
            actor: self.actor,
            reason: self.reason,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}
