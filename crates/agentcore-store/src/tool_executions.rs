use agentcore_types::{SessionId, ToolExecution, ToolExecutionId, ToolExecutionStatus};
use rusqlite::{params, OptionalExtension};

use crate::util::{opt_json_str, opt_ts, parse_json, parse_opt_json, parse_opt_ts, parse_ts, ts};
use crate::{Store, StoreError};

fn status_str(s: ToolExecutionStatus) -> &'static str {
    use ToolExecutionStatus::*;
    match s {
        Requested => "REQUESTED",
        PolicyDenied => "POLICY_DENIED",
        AwaitingConfirmation => "AWAITING_CONFIRMATION",
        Confirmed => "CONFIRMED",
        Running => "RUNNING",
        Succeeded => "SUCCEEDED",
        Failed => "FAILED",
        Cancelled => "CANCELLED",
        Expired => "EXPIRED",
    }
}

fn parse_status(s: &str) -> Result<ToolExecutionStatus, StoreError> {
    use ToolExecutionStatus::*;
    Ok(match s {
        "REQUESTED" => Requested,
        "POLICY_DENIED" => PolicyDenied,
        "AWAITING_CONFIRMATION" => AwaitingConfirmation,
        "CONFIRMED" => Confirmed,
        "RUNNING" => Running,
        "SUCCEEDED" => Succeeded,
        "FAILED" => Failed,
        "CANCELLED" => Cancelled,
        "EXPIRED" => Expired,
        other => return Err(StoreError::Serialization(format!("bad status {other}"))),
    })
}

const COLUMNS: &str = "id, session_id, user_id, tool_name, input, status, idempotency_key, result, error, started_at, finished_at, trace_id, created_at";

fn row_to_execution(row: &rusqlite::Row) -> rusqlite::Result<RawExec> {
    Ok(RawExec {
        id: row.get(0)?,
        session_id: row.get(1)?,
        user_id: row.get(2)?,
        tool_name: row.get(3)?,
        input: row.get(4)?,
        status: row.get(5)?,
        idempotency_key: row.get(6)?,
        result: row.get(7)?,
        error: row.get(8)?,
        started_at: row.get(9)?,
        finished_at: row.get(10)?,
        trace_id: row.get(11)?,
        created_at: row.get(12)?,
    })
}

struct RawExec {
    id: String,
    session_id: String,
    user_id: String,
    tool_name: String,
    input: String,
    status: String,
    idempotency_key: String,
    result: Option<String>,
    error: Option<String>,
    started_at: Option<String>,
    finished_at: Option<String>,
    trace_id: Option<String>,
    created_at: String,
}

impl RawExec {
    fn into_execution(self) -> Result<ToolExecution, StoreError> {
        Ok(ToolExecution {
            id: self.id.parse().map_err(|_| StoreError::Serialization("bad id".into()))?,
            session_id: self
                .session_id
                .parse()
                .map_err(|_| StoreError::Serialization("bad session id".into()))?,
            user_id: self
                .user_id
                .parse()
                .map_err(|_| StoreError::Serialization("bad user id".into()))?,
            tool_name: self.tool_name,
            input: parse_json(&self.input)?,
            status: parse_status(&self.status)?,
            idempotency_key: self.idempotency_key,
            result: parse_opt_json(self.result)?,
            error: parse_opt_json(self.error)?,
            started_at: parse_opt_ts(self.started_at)?,
            finished_at: parse_opt_ts(self.finished_at)?,
            trace_id: self.trace_id,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

/// Outcome of attempting the idempotency reservation (spec.md §4.G step 4).
pub enum Reservation {
    /// No prior row existed; `execution` has just been inserted as `REQUESTED`.
    Inserted(ToolExecution),
    /// A row already existed under `(user_id, idempotency_key)`.
    Existing(ToolExecution),
}

impl Store {
    /// Attempt to reserve `(user_id, idempotency_key)`. On unique-constraint
    /// violation, reads back the existing row instead of failing.
    pub async fn reserve_tool_execution(
        &self,
        exec: &ToolExecution,
    ) -> Result<Reservation, StoreError> {
        let conn = self.conn.lock().await;
        let insert = conn.execute(
            &format!(
                "INSERT INTO tool_executions ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ),
            params![
                exec.id.to_string(),
                exec.session_id.to_string(),
                exec.user_id.to_string(),
                exec.tool_name,
                exec.input.to_string(),
                status_str(exec.status),
                exec.idempotency_key,
                opt_json_str(&exec.result),
                opt_json_str(&exec.error),
                opt_ts(exec.started_at),
                opt_ts(exec.finished_at),
                exec.trace_id,
                ts(exec.created_at),
            ],
        );

        match insert {
            Ok(_) => Ok(Reservation::Inserted(exec.clone())),
            Err(e) if matches!(&e, rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation) => {
                tracing::debug!(
                    user_id = %exec.user_id,
                    idempotency_key = %exec.idempotency_key,
                    "idempotency key already reserved, returning existing execution"
                );
                let raw = conn.query_row(
                    &format!(
                        "SELECT {COLUMNS} FROM tool_executions WHERE user_id = ?1 AND idempotency_key = ?2"
                    ),
                    params![exec.user_id.to_string(), exec.idempotency_key],
                    row_to_execution,
                )?;
                Ok(Reservation::Existing(raw.into_execution()?))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_tool_execution(
        &self,
        id: ToolExecutionId,
    ) -> Result<Option<ToolExecution>, StoreError> {
        let conn = self.conn.lock().await;
        let raw = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM tool_executions WHERE id = ?1"),
                params![id.to_string()],
                row_to_execution,
            )
            .optional()?;
        raw.map(RawExec::into_execution).transpose()
    }

    /// Compare-and-set the status column, enforcing the legal-transition
    /// table server-side in addition to the in-memory check (spec.md §5:
    /// "row-level lock or compare-and-set on `status`").
    pub async fn transition_tool_execution(
        &self,
        id: ToolExecutionId,
        expected: ToolExecutionStatus,
        next: ToolExecutionStatus,
        result: Option<&serde_json::Value>,
        error: Option<&serde_json::Value>,
        started_at: Option<chrono::DateTime<chrono::Utc>>,
        finished_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<bool, StoreError> {
        if !expected.can_transition_to(next) {
            return Ok(false);
        }
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE tool_executions
             SET status = ?1, result = COALESCE(?2, result), error = COALESCE(?3, error),
                 started_at = COALESCE(?4, started_at), finished_at = COALESCE(?5, finished_at)
             WHERE id = ?6 AND status = ?7",
            params![
                status_str(next),
                result.map(|v| v.to_string()),
                error.map(|v| v.to_string()),
                started_at.map(ts),
                finished_at.map(ts),
                id.to_string(),
                status_str(expected),
            ],
        )?;
        Ok(updated == 1)
    }

    /// `RUNNING` rows in a session — used by the Orchestrator's
    /// best-effort cleanup on turn cancellation (spec.md §5).
    pub async fn running_executions_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<ToolExecution>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM tool_executions WHERE session_id = ?1 AND status = 'RUNNING'"
        ))?;
        let rows = stmt
            .query_map(params![session_id.to_string()], row_to_execution)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawExec::into_execution).collect()
    }

    /// All executions in a session, newest first — used by session history
    /// views and idempotency assertions.
    pub async fn tool_executions_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<ToolExecution>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM tool_executions WHERE session_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt
            .query_map(params![session_id.to_string()], row_to_execution)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawExec::into_execution).collect()
    }

    /// Most recent `limit` invocations of `(session_id, tool_name)`, newest
    /// first — used by the Guards' loop-breaker.
    pub async fn recent_executions_for_tool(
        &self,
        session_id: SessionId,
        tool_name: &str,
        limit: usize,
    ) -> Result<Vec<ToolExecution>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM tool_executions
             WHERE session_id = ?1 AND tool_name = ?2
             ORDER BY created_at DESC LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(
                params![session_id.to_string(), tool_name, limit as i64],
                row_to_execution,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawExec::into_execution).collect()
    }
}
