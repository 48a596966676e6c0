use agentcore_types::{Confirmation, ConfirmationId, ConfirmationStatus, SessionId, UserId};
use rusqlite::{params, OptionalExtension};

use crate::util::{parse_json, parse_ts, ts};
use crate::{Store, StoreError};

fn status_str(s: ConfirmationStatus) -> &'static str {
    use ConfirmationStatus::*;
    match s {
        Pending => "PENDING",
        Accepted => "ACCEPTED",
        Rejected => "REJECTED",
        Expired => "EXPIRED",
        Consumed => "CONSUMED",
    }
}

fn parse_status(s: &str) -> Result<ConfirmationStatus, StoreError> {
    use ConfirmationStatus::*;
    Ok(match s {
        "PENDING" => Pending,
        "ACCEPTED" => Accepted,
        "REJECTED" => Rejected,
        "EXPIRED" => Expired,
        "CONSUMED" => Consumed,
        other => return Err(StoreError::Serialization(format!("bad status {other}"))),
    })
}

const COLUMNS: &str = "id, tool_execution_id, session_id, user_id, status, prompt, required_phrase, expires_at, payload, created_at, updated_at";

fn row_to_confirmation(row: &rusqlite::Row) -> rusqlite::Result<RawConfirmation> {
    Ok(RawConfirmation {
        id: row.get(0)?,
        tool_execution_id: row.get(1)?,
        session_id: row.get(2)?,
        user_id: row.get(3)?,
        status: row.get(4)?,
        prompt: row.get(5)?,
        required_phrase: row.get(6)?,
        expires_at: row.get(7)?,
        payload: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

struct RawConfirmation {
    id: String,
    tool_execution_id: String,
    session_id: String,
    user_id: String,
    status: String,
    prompt: String,
    required_phrase: Option<String>,
    expires_at: String,
    payload: String,
    created_at: String,
    updated_at: String,
}

impl RawConfirmation {
    fn into_confirmation(self) -> Result<Confirmation, StoreError> {
        Ok(Confirmation {
            id: self.id.parse().map_err(|_| StoreError::Serialization("bad id".into()))?,
            tool_execution_id: self
                .tool_execution_id
                .parse()
                .map_err(|_| StoreError::Serialization("bad tool_execution_id".into()))?,
            session_id: self
                .session_id
                .parse()
                .map_err(|_| StoreError::Serialization("bad session id".into()))?,
            user_id: self
                .user_id
                .parse()
                .map_err(|_| StoreError::Serialization("bad user id".into()))?,
            status: parse_status(&self.status)?,
            prompt: self.prompt,
            required_phrase: self.required_phrase,
            expires_at: parse_ts(&self.expires_at)?,
            payload: parse_json(&self.payload)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

impl Store {
    /// Cancels any existing `PENDING` confirmation in the session, then
    /// inserts `confirmation`. At most one `PENDING` confirmation per session
    /// holds at any instant (spec.md §3 invariant 2 / §4.E).
    pub async fn create_confirmation(&self, confirmation: &Confirmation) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE confirmations SET status = 'CANCELLED', updated_at = ?1
             WHERE session_id = ?2 AND status = 'PENDING'",
            params![ts(confirmation.created_at), confirmation.session_id.to_string()],
        )?;
        tx.execute(
            &format!("INSERT INTO confirmations ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
            params![
                confirmation.id.to_string(),
                confirmation.tool_execution_id.to_string(),
                confirmation.session_id.to_string(),
                confirmation.user_id.to_string(),
                status_str(confirmation.status),
                confirmation.prompt,
                confirmation.required_phrase,
                ts(confirmation.expires_at),
                confirmation.payload.to_string(),
                ts(confirmation.created_at),
                ts(confirmation.updated_at),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub async fn get_confirmation(
        &self,
        id: ConfirmationId,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<Option<Confirmation>, StoreError> {
        let conn = self.conn.lock().await;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM confirmations
                     WHERE id = ?1 AND user_id = ?2 AND session_id = ?3"
                ),
                params![id.to_string(), user_id.to_string(), session_id.to_string()],
                row_to_confirmation,
            )
            .optional()?;
        raw.map(RawConfirmation::into_confirmation).transpose()
    }

    pub async fn pending_confirmation_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Option<Confirmation>, StoreError> {
        let conn = self.conn.lock().await;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM confirmations WHERE session_id = ?1 AND status = 'PENDING'"
                ),
                params![session_id.to_string()],
                row_to_confirmation,
            )
            .optional()?;
        raw.map(RawConfirmation::into_confirmation).transpose()
    }

    /// Most recent `ACCEPTED` confirmation for a session not yet consumed —
    /// used for the Tool Runtime's one-shot reservation check (spec.md §4.E).
    pub async fn accepted_confirmation_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Option<Confirmation>, StoreError> {
        let conn = self.conn.lock().await;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM confirmations
                     WHERE session_id = ?1 AND status = 'ACCEPTED'
                     ORDER BY updated_at DESC LIMIT 1"
                ),
                params![session_id.to_string()],
                row_to_confirmation,
            )
            .optional()?;
        raw.map(RawConfirmation::into_confirmation).transpose()
    }

    pub async fn set_confirmation_status(
        &self,
        id: ConfirmationId,
        expected: ConfirmationStatus,
        next: ConfirmationStatus,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE confirmations SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                status_str(next),
                ts(now),
                id.to_string(),
                status_str(expected),
            ],
        )?;
        Ok(updated == 1)
    }
}
