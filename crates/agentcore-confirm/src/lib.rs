//! Human-in-the-loop confirmation state machine (spec.md §4.E).

use chrono::Utc;
use serde_json::Value;

use agentcore_store::Store;
use agentcore_types::{
    AgentCoreError, Confirmation, ConfirmationId, ConfirmationStatus, PolicyDecisionKind,
    SessionId, UserId,
};

const DEFAULT_TTL_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct CreateConfirmation<'a> {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub tool_execution_id: agentcore_types::ToolExecutionId,
    pub tool_name: &'a str,
    pub args: Value,
    pub decision_type: PolicyDecisionKind,
    pub required_phrase: Option<String>,
    pub prompt: String,
    pub ttl_secs: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveResult {
    Accepted {
        tool_execution_id: agentcore_types::ToolExecutionId,
        tool_name: String,
        args: Value,
    },
    StillPending { prompt: String },
    Error { reason: String },
}

pub struct ConfirmationManager<'s> {
    store: &'s Store,
}

impl<'s> ConfirmationManager<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    /// Cancels any existing `PENDING` confirmation in the session and
    /// inserts a new one — the Store's `create_confirmation` performs the
    /// cancel-then-insert in a single transaction (spec.md §4.E).
    pub async fn create(&self, req: CreateConfirmation<'_>) -> Result<Confirmation, AgentCoreError> {
        let now = Utc::now();
        let ttl = req.ttl_secs.unwrap_or(DEFAULT_TTL_SECS);
        let confirmation = Confirmation {
            id: ConfirmationId::new(),
            tool_execution_id: req.tool_execution_id,
            session_id: req.session_id,
            user_id: req.user_id,
            status: ConfirmationStatus::Pending,
            prompt: req.prompt,
            required_phrase: req.required_phrase,
            expires_at: now + chrono::Duration::seconds(ttl),
            payload: serde_json::json!({ "tool_name": req.tool_name, "args": req.args }),
            created_at: now,
            updated_at: now,
        };
        self.store
            .create_confirmation(&confirmation)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?;
        Ok(confirmation)
    }

    pub async fn resolve(
        &self,
        confirmation_id: ConfirmationId,
        user_id: UserId,
        session_id: SessionId,
        utterance: &str,
    ) -> Result<ResolveResult, AgentCoreError> {
        let confirmation = self
            .store
            .get_confirmation(confirmation_id, user_id, session_id)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?
            .ok_or_else(|| AgentCoreError::NotFound(format!("confirmation {confirmation_id}")))?;

        if confirmation.status != ConfirmationStatus::Pending {
            return Ok(ResolveResult::Error {
                reason: format!("already_{}", status_suffix(confirmation.status)),
            });
        }

        let now = Utc::now();
        if now >= confirmation.expires_at {
            self.store
                .set_confirmation_status(
                    confirmation.id,
                    ConfirmationStatus::Pending,
                    ConfirmationStatus::Expired,
                    now,
                )
                .await
                .map_err(|e| AgentCoreError::Store(e.to_string()))?;
            return Ok(ResolveResult::Error {
                reason: "expired".to_string(),
            });
        }

        if let Some(phrase) = &confirmation.required_phrase {
            if !utterance.to_lowercase().contains(&phrase.to_lowercase()) {
                return Ok(ResolveResult::StillPending {
                    prompt: confirmation.prompt.clone(),
                });
            }
        }

        let transitioned = self
            .store
            .set_confirmation_status(
                confirmation.id,
                ConfirmationStatus::Pending,
                ConfirmationStatus::Accepted,
                now,
            )
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?;
        if !transitioned {
            return Ok(ResolveResult::Error {
                reason: "already_resolved".to_string(),
            });
        }

        let tool_name = confirmation.payload["tool_name"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let args = confirmation.payload["args"].clone();
        Ok(ResolveResult::Accepted {
            tool_execution_id: confirmation.tool_execution_id,
            tool_name,
            args,
        })
    }

    /// Marks an `ACCEPTED` confirmation as spent once the resumed execution
    /// it authorized has actually run (spec.md §4.E).
    pub async fn mark_consumed(&self, confirmation_id: ConfirmationId) -> Result<bool, AgentCoreError> {
        self.store
            .set_confirmation_status(
                confirmation_id,
                ConfirmationStatus::Accepted,
                ConfirmationStatus::Consumed,
                Utc::now(),
            )
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))
    }

    /// One-shot reservation check (spec.md §4.G step 5 / §4.E): an
    /// `ACCEPTED` confirmation whose `(tool_name, args)` exactly matches the
    /// pending invocation grants a single `USER_CONFIRMED` allow and is then
    /// marked `CONSUMED`.
    pub async fn consume_matching_reservation(
        &self,
        session_id: SessionId,
        tool_name: &str,
        args: &Value,
    ) -> Result<bool, AgentCoreError> {
        let Some(confirmation) = self
            .store
            .accepted_confirmation_for_session(session_id)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?
        else {
            return Ok(false);
        };

        let matches = confirmation.payload["tool_name"].as_str() == Some(tool_name)
            && confirmation.payload["args"] == *args;
        if !matches {
            return Ok(false);
        }

        let consumed = self
            .store
            .set_confirmation_status(
                confirmation.id,
                ConfirmationStatus::Accepted,
                ConfirmationStatus::Consumed,
                Utc::now(),
            )
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?;
        Ok(consumed)
    }
}

fn status_suffix(status: ConfirmationStatus) -> &'static str {
    use ConfirmationStatus::*;
    match status {
        Pending => "pending",
        Accepted => "accepted",
        Rejected => "rejected",
        Expired => "expired",
        Consumed => "consumed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_types::{Session, ToolExecution, ToolExecutionId, ToolExecutionStatus};

    /// `confirmations.tool_execution_id` FKs to `tool_executions`, which in
    /// turn FKs to `sessions`/`users`, so tests seed all three before
    /// creating a confirmation against a given `tool_execution_id`.
    async fn seed(store: &Store, session_id: SessionId, user_id: UserId) -> ToolExecutionId {
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
        let id = ToolExecutionId::new();
        let execution = ToolExecution {
            id,
            session_id,
            user_id,
            tool_name: "delete_file".to_string(),
            input: serde_json::json!({"path": "/tmp/x"}),
            status: ToolExecutionStatus::AwaitingConfirmation,
            idempotency_key: id.to_string(),
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
            trace_id: None,
            created_at: Utc::now(),
        };
        store.reserve_tool_execution(&execution).await.unwrap();
        execution.id
    }

    fn req(
        session_id: SessionId,
        user_id: UserId,
        tool_execution_id: ToolExecutionId,
        required_phrase: Option<String>,
    ) -> CreateConfirmation<'static> {
        CreateConfirmation {
            session_id,
            user_id,
            tool_execution_id,
            tool_name: "delete_file",
            args: serde_json::json!({"path": "/tmp/x"}),
            decision_type: PolicyDecisionKind::Escalate,
            required_phrase,
            prompt: "Say CONFIRM DELETE".to_string(),
            ttl_secs: None,
        }
    }

    #[tokio::test]
    async fn resolve_without_matching_phrase_stays_pending() {
        let store = Store::open_in_memory().unwrap();
        let user_id = UserId::new();
        let session_id = SessionId::new();
        let tool_execution_id = seed(&store, session_id, user_id).await;
        let mgr = ConfirmationManager::new(&store);
        let confirmation = mgr
            .create(req(session_id, user_id, tool_execution_id, Some("CONFIRM DELETE /TMP/X".to_string())))
            .await
            .unwrap();
        let result = mgr
            .resolve(confirmation.id, user_id, session_id, "yes please")
            .await
            .unwrap();
        assert!(matches!(result, ResolveResult::StillPending { .. }));
    }

    #[tokio::test]
    async fn resolve_with_matching_phrase_accepts() {
        let store = Store::open_in_memory().unwrap();
        let user_id = UserId::new();
        let session_id = SessionId::new();
        let tool_execution_id = seed(&store, session_id, user_id).await;
        let mgr = ConfirmationManager::new(&store);
        let confirmation = mgr
            .create(req(session_id, user_id, tool_execution_id, Some("CONFIRM DELETE /TMP/X".to_string())))
            .await
            .unwrap();
        let result = mgr
            .resolve(confirmation.id, user_id, session_id, "confirm delete /tmp/x")
            .await
            .unwrap();
        match result {
            ResolveResult::Accepted { tool_name, .. } => assert_eq!(tool_name, "delete_file"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn creating_a_second_confirmation_cancels_the_first() {
        let store = Store::open_in_memory().unwrap();
        let user_id = UserId::new();
        let session_id = SessionId::new();
        let tool_execution_id = seed(&store, session_id, user_id).await;
        let mgr = ConfirmationManager::new(&store);
        let first = mgr.create(req(session_id, user_id, tool_execution_id, None)).await.unwrap();
        mgr.create(req(session_id, user_id, tool_execution_id, None)).await.unwrap();
        let result = mgr
            .resolve(first.id, user_id, session_id, "confirm")
            .await
            .unwrap();
        assert!(matches!(result, ResolveResult::Error { .. }));
    }

    #[tokio::test]
    async fn accepted_reservation_is_consumed_once() {
        let store = Store::open_in_memory().unwrap();
        let user_id = UserId::new();
        let session_id = SessionId::new();
        let tool_execution_id = seed(&store, session_id, user_id).await;
        let mgr = ConfirmationManager::new(&store);
        let confirmation = mgr.create(req(session_id, user_id, tool_execution_id, None)).await.unwrap();
        mgr.resolve(confirmation.id, user_id, session_id, "confirm")
            .await
            .unwrap();

        let args = serde_json::json!({"path": "/tmp/x"});
        let first = mgr
            .consume_matching_reservation(session_id, "delete_file", &args)
            .await
            .unwrap();
        assert!(first);
        let second = mgr
            .consume_matching_reservation(session_id, "delete_file", &args)
            .await
            .unwrap();
        assert!(!second);
    }
}
