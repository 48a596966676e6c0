use agentcore_types::{SessionId, ToolCall, ToolCallId, ToolCallStatus};
use rusqlite::params;

use crate::util::{parse_ts, ts};
use crate::{Store, StoreError};

fn status_str(s: ToolCallStatus) -> &'static str {
    match s {
        ToolCallStatus::Ok => "ok",
        ToolCallStatus::Error => "error",
    }
}

fn parse_status(s: &str) -> Result<ToolCallStatus, StoreError> {
    match s {
        "ok" => Ok(ToolCallStatus::Ok),
        "error" => Ok(ToolCallStatus::Error),
        other => Err(StoreError::Serialization(format!("bad status {other}"))),
    }
}

impl Store {
    pub async fn record_tool_call(&self, call: &ToolCall) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO tool_calls (id, session_id, tool_name, status, latency_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                call.id.to_string(),
                call.session_id.to_string(),
                call.tool_name,
                status_str(call.status),
                call.latency_ms,
                ts(call.created_at),
            ],
        )?;
        Ok(())
    }

    /// Count of `(session_id, tool_name)` invocations within the last
    /// `window_secs` seconds, relative to `now` — backs the rate-limit guard.
    pub async fn tool_call_count_since(
        &self,
        session_id: SessionId,
        tool_name: &str,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<u32, StoreError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tool_calls
             WHERE session_id = ?1 AND tool_name = ?2 AND created_at >= ?3",
            params![session_id.to_string(), tool_name, ts(since)],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Audit trail for a session's history view (spec.md §6), newest first.
    pub async fn tool_calls_for_session(&self, session_id: SessionId) -> Result<Vec<ToolCall>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, tool_name, status, latency_ms, created_at
             FROM tool_calls WHERE session_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![session_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, session_id, tool_name, status, latency_ms, created_at)| {
                Ok(ToolCall {
                    id: id.parse::<ToolCallId>().map_err(|_| StoreError::Serialization("bad id".into()))?,
                    session_id: session_id
                        .parse()
                        .map_err(|_| StoreError::Serialization("bad session id".into()))?,
                    tool_name,
                    status: parse_status(&status)?,
                    latency_ms,
                    created_at: parse_ts(&created_at)?,
                })
            })
            .collect()
    }
}
