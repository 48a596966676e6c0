use agentcore_types::{AgentMessage, MessageId, MessageRole, MessageStatus, Modality, SessionId};
use rusqlite::{params, OptionalExtension};

use crate::util::{parse_ts, ts};
use crate::{Store, StoreError};

fn role_str(r: MessageRole) -> &'static str {
    match r {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    }
}

fn parse_role(s: &str) -> Result<MessageRole, StoreError> {
    match s {
        "user" => Ok(MessageRole::User),
        "assistant" => Ok(MessageRole::Assistant),
        "system" => Ok(MessageRole::System),
        other => Err(StoreError::Serialization(format!("bad role {other}"))),
    }
}

fn modality_str(m: Modality) -> &'static str {
    match m {
        Modality::Text => "text",
        Modality::Voice => "voice",
    }
}

fn parse_modality(s: &str) -> Result<Modality, StoreError> {
    match s {
        "text" => Ok(Modality::Text),
        "voice" => Ok(Modality::Voice),
        other => Err(StoreError::Serialization(format!("bad modality {other}"))),
    }
}

fn status_str(s: MessageStatus) -> &'static str {
    match s {
        MessageStatus::Created => "CREATED",
        MessageStatus::Processing => "PROCESSING",
        MessageStatus::Completed => "COMPLETED",
        MessageStatus::Failed => "FAILED",
    }
}

fn parse_status(s: &str) -> Result<MessageStatus, StoreError> {
    match s {
        "CREATED" => Ok(MessageStatus::Created),
        "PROCESSING" => Ok(MessageStatus::Processing),
        "COMPLETED" => Ok(MessageStatus::Completed),
        "FAILED" => Ok(MessageStatus::Failed),
        other => Err(StoreError::Serialization(format!("bad status {other}"))),
    }
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<RawMessage> {
    Ok(RawMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        user_id: row.get(2)?,
        role: row.get(3)?,
        content: row.get(4)?,
        modality: row.get(5)?,
        status: row.get(6)?,
        idempotency_key: row.get(7)?,
        trace_id: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

struct RawMessage {
    id: String,
    session_id: String,
    user_id: String,
    role: String,
    content: String,
    modality: String,
    status: String,
    idempotency_key: Option<String>,
    trace_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawMessage {
    fn into_message(self) -> Result<AgentMessage, StoreError> {
        Ok(AgentMessage {
            id: self.id.parse().map_err(|_| StoreError::Serialization("bad id".into()))?,
            session_id: self
                .session_id
                .parse()
                .map_err(|_| StoreError::Serialization("bad session id".into()))?,
            user_id: self
                .user_id
                .parse()
                .map_err(|_| StoreError::Serialization("bad user id".into()))?,
            role: parse_role(&self.role)?,
            content: self.content,
            modality: parse_modality(&self.modality)?,
            status: parse_status(&self.status)?,
            idempotency_key: self.idempotency_key,
            trace_id: self.trace_id,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, session_id, user_id, role, content, modality, status, idempotency_key, trace_id, created_at, updated_at";

impl Store {
    /// Idempotent insert: if `idempotency_key` matches an existing `role=user`
    /// row in the same session, returns it unchanged instead of inserting.
    pub async fn save_user_message(&self, msg: &AgentMessage) -> Result<AgentMessage, StoreError> {
        debug_assert_eq!(msg.role, MessageRole::User);
        let conn = self.conn.lock().await;

        if let Some(key) = &msg.idempotency_key {
            let existing = conn
                .query_row(
                    &format!(
                        "SELECT {SELECT_COLUMNS} FROM agent_messages
                         WHERE session_id = ?1 AND role = 'user' AND idempotency_key = ?2"
                    ),
                    params![msg.session_id.to_string(), key],
                    row_to_message,
                )
                .optional()?;
            if let Some(raw) = existing {
                return raw.into_message();
            }
        }

        conn.execute(
            &format!(
                "INSERT INTO agent_messages ({SELECT_COLUMNS})
                 VALUES (?1, ?2, ?3, 'user', ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                msg.id.to_string(),
                msg.session_id.to_string(),
                msg.user_id.to_string(),
                msg.content,
                modality_str(msg.modality),
                status_str(msg.status),
                msg.idempotency_key,
                msg.trace_id,
                ts(msg.created_at),
                ts(msg.updated_at),
            ],
        )?;
        Ok(msg.clone())
    }

    pub async fn save_assistant_message(&self, msg: &AgentMessage) -> Result<AgentMessage, StoreError> {
        debug_assert_eq!(msg.role, MessageRole::Assistant);
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "INSERT INTO agent_messages ({SELECT_COLUMNS})
                 VALUES (?1, ?2, ?3, 'assistant', ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                msg.id.to_string(),
                msg.session_id.to_string(),
                msg.user_id.to_string(),
                msg.content,
                modality_str(msg.modality),
                status_str(msg.status),
                msg.idempotency_key,
                msg.trace_id,
                ts(msg.created_at),
                ts(msg.updated_at),
            ],
        )?;
        Ok(msg.clone())
    }

    /// Last `limit` messages in a session, chronological (oldest first),
    /// ties broken by id.
    pub async fn recent_messages(
        &self,
        session_id: SessionId,
        limit: usize,
    ) -> Result<Vec<AgentMessage>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM agent_messages
             WHERE session_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![session_id.to_string(), limit as i64], row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;
        let mut messages = rows
            .into_iter()
            .map(RawMessage::into_message)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Find the assistant reply correlated to a trace id, used to make
    /// duplicate `/message` submissions return the same response (spec.md
    /// §4.I step 2).
    pub async fn assistant_reply_for_trace(
        &self,
        session_id: SessionId,
        trace_id: &str,
    ) -> Result<Option<AgentMessage>, StoreError> {
        let conn = self.conn.lock().await;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM agent_messages
                     WHERE session_id = ?1 AND role = 'assistant' AND trace_id = ?2
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![session_id.to_string(), trace_id],
                row_to_message,
            )
            .optional()?;
        raw.map(RawMessage::into_message).transpose()
    }

    pub async fn get_message(&self, id: MessageId) -> Result<Option<AgentMessage>, StoreError> {
        let conn = self.conn.lock().await;
        let raw = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM agent_messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .optional()?;
        raw.map(RawMessage::into_message).transpose()
    }
}
