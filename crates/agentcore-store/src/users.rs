use std::collections::HashSet;

use agentcore_types::{User, UserId};
use rusqlite::params;

use crate::util::parse_json;
use crate::{Store, StoreError};

impl Store {
    pub async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let scopes = serde_json::to_string(&user.scopes)?;
        let settings = user.settings.to_string();
        conn.execute(
            "INSERT INTO users (id, email, scopes, settings, is_superuser)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               email = excluded.email,
               scopes = excluded.scopes,
               settings = excluded.settings,
               is_superuser = excluded.is_superuser",
            params![
                user.id.to_string(),
                user.email,
                scopes,
                settings,
                user.is_superuser as i64,
            ],
        )?;
        Ok(())
    }

    /// Inserts a minimal row for `id` if one doesn't already exist. Entry
    /// points that mint sessions for a caller-supplied user id without a
    /// separate provisioning step call this first, since `sessions` and
    /// `agent_messages` both carry a foreign key to `users`.
    pub async fn ensure_user(&self, id: UserId) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO users (id, email, scopes, settings, is_superuser)
             VALUES (?1, NULL, '[]', '{}', 0)
             ON CONFLICT(id) DO NOTHING",
            params![id.to_string()],
        )?;
        Ok(())
    }

    pub async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, email, scopes, settings, is_superuser FROM users WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id.to_string()])?;
        if let Some(row) = rows.next()? {
            let id_str: String = row.get(0)?;
            let scopes_str: String = row.get(2)?;
            let scopes: HashSet<String> = serde_json::from_str(&scopes_str)?;
            Ok(Some(User {
                id: id_str.parse().map_err(|_| StoreError::Serialization("bad uuid".into()))?,
                email: row.get(1)?,
                scopes,
                settings: parse_json(&row.get::<_, String>(3)?)?,
                is_superuser: row.get::<_, i64>(4)? != 0,
            }))
        } else {
            Ok(None)
        }
    }
}
