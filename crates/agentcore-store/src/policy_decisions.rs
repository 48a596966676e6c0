use agentcore_types::{PolicyDecisionKind, PolicyDecisionRecord, SessionId};
use rusqlite::params;

use crate::util::{parse_ts, ts};
use crate::{Store, StoreError};

fn kind_str(k: PolicyDecisionKind) -> &'static str {
    use PolicyDecisionKind::*;
    match k {
        Allow => "ALLOW",
        AllowWithConfirmation => "ALLOW_WITH_CONFIRMATION",
        Escalate => "ESCALATE",
        Deny => "DENY",
    }
}

fn parse_kind(s: &str) -> Result<PolicyDecisionKind, StoreError> {
    use PolicyDecisionKind::*;
    Ok(match s {
        "ALLOW" => Allow,
        "ALLOW_WITH_CONFIRMATION" => AllowWithConfirmation,
        "ESCALATE" => Escalate,
        "DENY" => Deny,
        other => return Err(StoreError::Serialization(format!("bad decision {other}"))),
    })
}

const COLUMNS: &str = "id, session_id, user_id, tool_name, decision, risk_score, reason_code, created_at";

fn row_to_decision(row: &rusqlite::Row) -> rusqlite::Result<RawDecision> {
    Ok(RawDecision {
        id: row.get(0)?,
        session_id: row.get(1)?,
        user_id: row.get(2)?,
        tool_name: row.get(3)?,
        decision: row.get(4)?,
        risk_score: row.get(5)?,
        reason_code: row.get(6)?,
        created_at: row.get(7)?,
    })
}

struct RawDecision {
    id: String,
    session_id: String,
    user_id: String,
    tool_name: String,
    decision: String,
    risk_score: i64,
    reason_code: String,
    created_at: String,
}

impl RawDecision {
    fn into_record(self) -> Result<PolicyDecisionRecord, StoreError> {
        Ok(PolicyDecisionRecord {
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
            decision: parse_kind(&self.decision)?,
            risk_score: self.risk_score as u8,
            reason_code: self.reason_code,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

impl Store {
    /// Audit-only: recorded for every policy evaluation, never consulted for
    /// logic (spec.md §3).
    pub async fn record_policy_decision(&self, record: &PolicyDecisionRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO policy_decisions (id, session_id, user_id, tool_name, decision, risk_score, reason_code, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id.to_string(),
                record.session_id.to_string(),
                record.user_id.to_string(),
                record.tool_name,
                kind_str(record.decision),
                record.risk_score as i64,
                record.reason_code,
                ts(record.created_at),
            ],
        )?;
        Ok(())
    }

    /// Audit trail for a session's history view (spec.md §6), newest first.
    pub async fn policy_decisions_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<PolicyDecisionRecord>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM policy_decisions WHERE session_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt
            .query_map(params![session_id.to_string()], row_to_decision)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawDecision::into_record).collect()
    }
}
