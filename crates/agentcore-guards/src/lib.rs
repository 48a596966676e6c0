//! Non-blocking safety nets applied after policy, before execution (spec.md
//! §4.F). Neither guard counts its own rejections — they only read the
//! `ToolCall`/`ToolExecution` audit tables `agentcore-store` already
//! maintains.

use chrono::Utc;

use agentcore_store::Store;
use agentcore_types::{AgentCoreError, SessionId, ToolExecutionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardRejection {
    RateLimited,
    LoopBroken,
}

pub async fn check_guards(
    store: &Store,
    session_id: SessionId,
    tool_name: &str,
) -> Result<Option<GuardRejection>, AgentCoreError> {
    let since = Utc::now() - chrono::Duration::seconds(60);
    let calls_in_window = store
        .tool_call_count_since(session_id, tool_name, since)
        .await
        .map_err(|e| AgentCoreError::Store(e.to_string()))?;
    if agentcore_policy::rate_limit_exceeded(calls_in_window) {
        return Ok(Some(GuardRejection::RateLimited));
    }

    let recent = store
        .recent_executions_for_tool(session_id, tool_name, 3)
        .await
        .map_err(|e| AgentCoreError::Store(e.to_string()))?;
    let recent_succeeded: Vec<bool> = recent
        .iter()
        .map(|e| e.status == ToolExecutionStatus::Succeeded)
        .collect();
    if agentcore_policy::loop_broken(&recent_succeeded) {
        return Ok(Some(GuardRejection::LoopBroken));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_types::{Session, ToolExecution, ToolExecutionId, UserId};

    async fn seed(store: &Store, session_id: SessionId, user_id: UserId) {
        store.ensure_user(user_id).await.unwrap();
        store
            .create_session(&Session {
                id: session_id,
                user_id,
                started_at: Utc::now(),
                expires_at: None,
                revoked_at: None,
                scopes_override: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn no_history_passes_both_guards() {
        let store = Store::open_in_memory().unwrap();
        let session_id = SessionId::new();
        let result = check_guards(&store, session_id, "get_system_info").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn three_consecutive_failures_break_the_loop() {
        let store = Store::open_in_memory().unwrap();
        let session_id = SessionId::new();
        let user_id = UserId::new();
        seed(&store, session_id, user_id).await;
        for _ in 0..3 {
            let now = Utc::now();
            let exec = ToolExecution {
                id: ToolExecutionId::new(),
                session_id,
                user_id,
                tool_name: "send_email".to_string(),
                input: serde_json::json!({}),
                status: ToolExecutionStatus::Requested,
                idempotency_key: uuid::Uuid::new_v4().to_string(),
                result: None,
                error: None,
                started_at: None,
                finished_at: None,
                trace_id: None,
                created_at: now,
            };
            store.reserve_tool_execution(&exec).await.unwrap();
            store
                .transition_tool_execution(
                    exec.id,
                    ToolExecutionStatus::Requested,
                    ToolExecutionStatus::Running,
                    None,
                    None,
                    Some(now),
                    None,
                )
                .await
                .unwrap();
            store
                .transition_tool_execution(
                    exec.id,
                    ToolExecutionStatus::Running,
                    ToolExecutionStatus::Failed,
                    None,
                    Some(&serde_json::json!({"error": "boom"})),
                    None,
                    Some(now),
                )
                .await
                .unwrap();
        }
        let result = check_guards(&store, session_id, "send_email").await.unwrap();
        assert_eq!(result, Some(GuardRejection::LoopBroken));
    }
}
