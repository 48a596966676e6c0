use rusqlite::Connection;

use crate::StoreError;

pub(crate) fn init(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);
        INSERT OR IGNORE INTO schema_version (version) VALUES (1);

        CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            email         TEXT,
            scopes        TEXT NOT NULL DEFAULT '[]',
            settings      TEXT NOT NULL DEFAULT '{}',
            is_superuser  INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id               TEXT PRIMARY KEY,
            user_id          TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            started_at       TEXT NOT NULL,
            expires_at       TEXT,
            revoked_at       TEXT,
            scopes_override  TEXT
        );

        CREATE TABLE IF NOT EXISTS agent_messages (
            id              TEXT PRIMARY KEY,
            session_id      TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            modality        TEXT NOT NULL,
            status          TEXT NOT NULL,
            idempotency_key TEXT,
            trace_id        TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_agent_messages_session_created
            ON agent_messages(session_id, created_at, id);
        CREATE UNIQUE INDEX IF NOT EXISTS uq_agent_messages_session_idem
            ON agent_messages(session_id, idempotency_key)
            WHERE idempotency_key IS NOT NULL AND role = 'user';

        CREATE TABLE IF NOT EXISTS tool_executions (
            id              TEXT PRIMARY KEY,
            session_id      TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            tool_name       TEXT NOT NULL,
            input           TEXT NOT NULL DEFAULT '{}',
            status          TEXT NOT NULL,
            idempotency_key TEXT NOT NULL,
            result          TEXT,
            error           TEXT,
            started_at      TEXT,
            finished_at     TEXT,
            trace_id        TEXT,
            created_at      TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS uq_tool_executions_user_idem
            ON tool_executions(user_id, idempotency_key);
        CREATE INDEX IF NOT EXISTS ix_tool_executions_session_created
            ON tool_executions(session_id, created_at);
        CREATE INDEX IF NOT EXISTS ix_tool_executions_session_tool
            ON tool_executions(session_id, tool_name, created_at);

        CREATE TABLE IF NOT EXISTS tool_calls (
            id          TEXT PRIMARY KEY,
            session_id  TEXT NOT NULL,
            tool_name   TEXT NOT NULL,
            status      TEXT NOT NULL,
            latency_ms  INTEGER NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_tool_calls_session_tool_created
            ON tool_calls(session_id, tool_name, created_at);

        CREATE TABLE IF NOT EXISTS confirmations (
            id                  TEXT PRIMARY KEY,
            tool_execution_id   TEXT NOT NULL REFERENCES tool_executions(id) ON DELETE CASCADE,
            session_id          TEXT NOT NULL,
            user_id             TEXT NOT NULL,
            status              TEXT NOT NULL,
            prompt              TEXT NOT NULL,
            required_phrase     TEXT,
            expires_at          TEXT NOT NULL,
            payload             TEXT NOT NULL DEFAULT '{}',
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_confirmations_session_status
            ON confirmations(session_id, status);

        CREATE TABLE IF NOT EXISTS policy_decisions (
            id          TEXT PRIMARY KEY,
            session_id  TEXT NOT NULL,
            user_id     TEXT NOT NULL,
            tool_name   TEXT NOT NULL,
            decision    TEXT NOT NULL,
            risk_score  INTEGER NOT NULL,
            reason_code TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_policy_decisions_session_created
            ON policy_decisions(session_id, created_at);

        CREATE TABLE IF NOT EXISTS memories (
            id           TEXT PRIMARY KEY,
            user_id      TEXT NOT NULL,
            session_id   TEXT,
            type         TEXT NOT NULL,
            source       TEXT NOT NULL,
            content      TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            embedding    BLOB NOT NULL,
            metadata     TEXT NOT NULL DEFAULT '{}',
            is_deleted   INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL,
            expires_at   TEXT
        );
        CREATE UNIQUE INDEX IF NOT EXISTS uq_memories_user_hash_live
            ON memories(user_id, content_hash) WHERE is_deleted = 0;
        CREATE INDEX IF NOT EXISTS ix_memories_user_type
            ON memories(user_id, type);

        CREATE TABLE IF NOT EXISTS memory_events (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            memory_id   TEXT NOT NULL,
            event_type  TEXT NOT NULL,
            actor       TEXT NOT NULL,
            reason      TEXT,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_memory_events_memory
            ON memory_events(memory_id, created_at);
        ",
    )?;
    Ok(())
}
