use std::collections::HashSet;

use agentcore_types::{Session, SessionId, UserId};
use rusqlite::{params, OptionalExtension};

use crate::util::{opt_ts, parse_opt_ts, parse_ts, ts};
use crate::{Store, StoreError};

impl Store {
    pub async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let scopes_override = session
            .scopes_override
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        conn.execute(
            "INSERT INTO sessions (id, user_id, started_at, expires_at, revoked_at, scopes_override)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id.to_string(),
                session.user_id.to_string(),
                ts(session.started_at),
                opt_ts(session.expires_at),
                opt_ts(session.revoked_at),
                scopes_override,
            ],
        )?;
        Ok(())
    }

    pub async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT id, user_id, started_at, expires_at, revoked_at, scopes_override
                 FROM sessions WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((id_s, user_id_s, started_at, expires_at, revoked_at, scopes_override)) = row
        else {
            return Ok(None);
        };

        let scopes_override: Option<HashSet<String>> = scopes_override
            .map(|s| serde_json::from_str(&s))
            .transpose()?;

        Ok(Some(Session {
            id: id_s.parse().map_err(|_| StoreError::Serialization("bad session id".into()))?,
            user_id: user_id_s
                .parse()
                .map_err(|_| StoreError::Serialization("bad user id".into()))?,
            started_at: parse_ts(&started_at)?,
            expires_at: parse_opt_ts(expires_at)?,
            revoked_at: parse_opt_ts(revoked_at)?,
            scopes_override,
        }))
    }

    pub async fn revoke_session(&self, id: SessionId, now: chrono::DateTime<chrono::Utc>) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sessions SET revoked_at = ?1 WHERE id = ?2",
            params![ts(now), id.to_string()],
        )?;
        Ok(())
    }

    pub async fn sessions_for_user(&self, user_id: UserId) -> Result<Vec<SessionId>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT id FROM sessions WHERE user_id = ?1")?;
        let mut rows = stmt.query(params![user_id.to_string()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let id_s: String = row.get(0)?;
            out.push(
                id_s.parse()
                    .map_err(|_| StoreError::Serialization("bad session id".into()))?,
            );
        }
        Ok(out)
    }
}
