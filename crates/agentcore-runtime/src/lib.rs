//! The Tool Runtime: the single, mandatory execution path for every tool
//! invocation (spec.md §4.G). Every intermediate exit persists something, so
//! a crash mid-execution leaves a recoverable trace.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;

use agentcore_confirm::{ConfirmationManager, CreateConfirmation};
use agentcore_guards::{check_guards, GuardRejection};
use agentcore_policy::{evaluate, PolicyCheck, ToolFlags};
use agentcore_store::{Reservation, Store};
use agentcore_tools::{lookup, validate_args, ToolContext};
use agentcore_types::{
    ActionScope, AgentCoreError, ConfirmationId, PolicyDecisionId, PolicyDecisionKind,
    PolicyDecisionRecord, SessionId, ToolCall, ToolCallId, ToolCallStatus, ToolExecution,
    ToolExecutionId, ToolExecutionStatus, UserId,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ToolResultStatus {
    Succeeded,
    Denied,
    Error,
    NeedsConfirmation,
}

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub status: ToolResultStatus,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub latency_ms: i64,
    pub redactions_applied: Vec<String>,
    pub policy_decision_id: Option<PolicyDecisionId>,
    pub pending_confirmation_id: Option<ConfirmationId>,
    pub confirmation_prompt: Option<String>,
}

impl ToolResult {
    fn denied(reason: impl Into<String>, latency_ms: i64) -> Self {
        Self {
            status: ToolResultStatus::Denied,
            data: None,
            error: Some(reason.into()),
            latency_ms,
            redactions_applied: Vec::new(),
            policy_decision_id: None,
            pending_confirmation_id: None,
            confirmation_prompt: None,
        }
    }

    fn error(reason: impl Into<String>, latency_ms: i64) -> Self {
        Self {
            status: ToolResultStatus::Error,
            data: None,
            error: Some(reason.into()),
            latency_ms,
            redactions_applied: Vec::new(),
            policy_decision_id: None,
            pending_confirmation_id: None,
            confirmation_prompt: None,
        }
    }
}

pub struct ToolRuntime {
    store: Arc<Store>,
    memory: Arc<agentcore_memory::MemoryStore>,
}

pub struct InvokeRequest {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub effective_scopes: std::collections::HashSet<String>,
    pub tool_name: String,
    pub args: Value,
    pub idempotency_key: Option<String>,
    pub target_entity: String,
    pub intent_summary: String,
}

impl ToolRuntime {
    pub fn new(store: Arc<Store>, memory: Arc<agentcore_memory::MemoryStore>) -> Self {
        Self { store, memory }
    }

    pub async fn invoke(&self, req: InvokeRequest) -> Result<ToolResult, AgentCoreError> {
        let start = Instant::now();
        let idempotency_key = req
            .idempotency_key
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        // Step 1: registry lookup.
        let Some(entry) = lookup(&req.tool_name) else {
            self.record_call(req.session_id, &req.tool_name, ToolCallStatus::Error, &start)
                .await?;
            return Ok(ToolResult::denied("UNKNOWN_TOOL", elapsed_ms(&start)));
        };

        // Step 2: scope check.
        if !req.effective_scopes.contains(entry.spec.required_scope) {
            self.record_call(req.session_id, &req.tool_name, ToolCallStatus::Error, &start)
                .await?;
            return Ok(ToolResult::denied("SCOPE_MISSING", elapsed_ms(&start)));
        }

        // Step 3: argument validation.
        if let Err(e) = validate_args(&entry.spec, &req.args) {
            self.record_call(req.session_id, &req.tool_name, ToolCallStatus::Error, &start)
                .await?;
            return Ok(ToolResult::error(format!("VALIDATION: {e}"), elapsed_ms(&start)));
        }

        // Step 4: idempotency reservation.
        let now = Utc::now();
        let pending_exec = ToolExecution {
            id: ToolExecutionId::new(),
            session_id: req.session_id,
            user_id: req.user_id,
            tool_name: req.tool_name.clone(),
            input: req.args.clone(),
            status: ToolExecutionStatus::Requested,
            idempotency_key,
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
            trace_id: None,
            created_at: now,
        };
        let reservation = self
            .store
            .reserve_tool_execution(&pending_exec)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?;
        let execution = match reservation {
            Reservation::Inserted(exec) => exec,
            Reservation::Existing(exec) => match exec.status {
                ToolExecutionStatus::Succeeded => {
                    return Ok(ToolResult {
                        status: ToolResultStatus::Succeeded,
                        data: exec.result,
                        error: None,
                        latency_ms: elapsed_ms(&start),
                        redactions_applied: Vec::new(),
                        policy_decision_id: None,
                        pending_confirmation_id: None,
                        confirmation_prompt: None,
                    });
                }
                ToolExecutionStatus::Failed => {
                    return Ok(ToolResult {
                        status: ToolResultStatus::Error,
                        data: None,
                        error: exec.error.map(|e| e.to_string()),
                        latency_ms: elapsed_ms(&start),
                        redactions_applied: Vec::new(),
                        policy_decision_id: None,
                        pending_confirmation_id: None,
                        confirmation_prompt: None,
                    });
                }
                ToolExecutionStatus::Running => {
                    return Ok(ToolResult::error("IN_FLIGHT", elapsed_ms(&start)));
                }
                _ => exec,
            },
        };

        // Step 5: reserved confirmation check.
        let confirm_mgr = ConfirmationManager::new(&self.store);
        let reservation_matched = confirm_mgr
            .consume_matching_reservation(req.session_id, &req.tool_name, &req.args)
            .await?;

        let decision = if reservation_matched {
            agentcore_policy::PolicyDecision {
                decision: PolicyDecisionKind::Allow,
                risk: 0,
                reason_code: "USER_CONFIRMED",
                required_phrase: None,
                prompt: None,
                expires_at: None,
            }
        } else {
            // Step 6: policy.
            let redacted_args = agentcore_redact::redact(&req.args).value;
            let check = PolicyCheck {
                tool_name: req.tool_name.clone(),
                tool_found: true,
                flags: ToolFlags {
                    side_effects: entry.spec.side_effects,
                    external_communication: entry.spec.external_communication,
                    destructive: entry.spec.destructive,
                    category: entry.spec.category,
                },
                action_type: entry.spec.default_action_type,
                target_entity: req.target_entity.clone(),
                scope: ActionScope::Single,
                sensitivity: entry.spec.default_sensitivity,
                intent_summary: req.intent_summary.clone(),
                args_preview: redacted_args,
            };
            evaluate(&check, now)
        };

        let decision_record = PolicyDecisionRecord {
            id: PolicyDecisionId::new(),
            session_id: req.session_id,
            user_id: req.user_id,
            tool_name: req.tool_name.clone(),
            decision: decision.decision,
            risk_score: decision.risk,
            reason_code: decision.reason_code.to_string(),
            created_at: now,
        };
        self.store
            .record_policy_decision(&decision_record)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?;

        match decision.decision {
            PolicyDecisionKind::Deny => {
                self.store
                    .transition_tool_execution(
                        execution.id,
                        ToolExecutionStatus::Requested,
                        ToolExecutionStatus::PolicyDenied,
                        None,
                        None,
                        None,
                        None,
                    )
                    .await
                    .map_err(|e| AgentCoreError::Store(e.to_string()))?;
                let mut result = ToolResult::denied(decision.reason_code, elapsed_ms(&start));
                result.policy_decision_id = Some(decision_record.id);
                return Ok(result);
            }
            PolicyDecisionKind::AllowWithConfirmation | PolicyDecisionKind::Escalate => {
                self.store
                    .transition_tool_execution(
                        execution.id,
                        ToolExecutionStatus::Requested,
                        ToolExecutionStatus::AwaitingConfirmation,
                        None,
                        None,
                        None,
                        None,
                    )
                    .await
                    .map_err(|e| AgentCoreError::Store(e.to_string()))?;
                let confirmation = confirm_mgr
                    .create(CreateConfirmation {
                        session_id: req.session_id,
                        user_id: req.user_id,
                        tool_execution_id: execution.id,
                        tool_name: &req.tool_name,
                        args: req.args.clone(),
                        decision_type: decision.decision,
                        required_phrase: decision.required_phrase.clone(),
                        prompt: decision.prompt.clone().unwrap_or_default(),
                        ttl_secs: None,
                    })
                    .await?;
                return Ok(ToolResult {
                    status: ToolResultStatus::NeedsConfirmation,
                    data: None,
                    error: None,
                    latency_ms: elapsed_ms(&start),
                    redactions_applied: Vec::new(),
                    policy_decision_id: Some(decision_record.id),
                    pending_confirmation_id: Some(confirmation.id),
                    confirmation_prompt: Some(confirmation.prompt),
                });
            }
            PolicyDecisionKind::Allow => {}
        }

        // Step 7: guards.
        if let Some(rejection) = check_guards(&self.store, req.session_id, &req.tool_name).await? {
            self.store
                .transition_tool_execution(
                    execution.id,
                    ToolExecutionStatus::Requested,
                    ToolExecutionStatus::Failed,
                    None,
                    Some(&serde_json::json!({ "reason": guard_reason(rejection) })),
                    None,
                    Some(Utc::now()),
                )
                .await
                .map_err(|e| AgentCoreError::Store(e.to_string()))?;
            self.record_call(req.session_id, &req.tool_name, ToolCallStatus::Error, &start)
                .await?;
            let mut result = ToolResult::denied(guard_reason(rejection), elapsed_ms(&start));
            result.policy_decision_id = Some(decision_record.id);
            return Ok(result);
        }

        // Step 8: execute.
        let started_at = Utc::now();
        self.store
            .transition_tool_execution(
                execution.id,
                ToolExecutionStatus::Requested,
                ToolExecutionStatus::Running,
                None,
                None,
                Some(started_at),
                None,
            )
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?;

        let ctx = ToolContext {
            user_id: req.user_id,
            session_id: req.session_id,
            memory: self.memory.clone(),
        };
        let invocation = entry.handler.invoke(&ctx, req.args.clone()).await;
        let finished_at = Utc::now();

        // Step 9: redact.
        let (redacted_result, redacted_error, redactions_applied, status, tool_call_status) =
            match invocation {
                Ok(value) => {
                    let redacted = agentcore_redact::redact(&value);
                    (
                        Some(redacted.value),
                        None,
                        redacted.redacted_paths,
                        ToolExecutionStatus::Succeeded,
                        ToolCallStatus::Ok,
                    )
                }
                Err(e) => {
                    let err_value = serde_json::json!({ "message": e.to_string() });
                    let redacted = agentcore_redact::redact(&err_value);
                    (None, Some(redacted.value), redacted.redacted_paths, ToolExecutionStatus::Failed, ToolCallStatus::Error)
                }
            };

        // Step 10: persist.
        self.store
            .transition_tool_execution(
                execution.id,
                ToolExecutionStatus::Running,
                status,
                redacted_result.as_ref(),
                redacted_error.as_ref(),
                None,
                Some(finished_at),
            )
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?;
        self.record_call(req.session_id, &req.tool_name, tool_call_status, &start)
            .await?;

        // Step 11: return.
        Ok(ToolResult {
            status: if status == ToolExecutionStatus::Succeeded {
                ToolResultStatus::Succeeded
            } else {
                ToolResultStatus::Error
            },
            data: redacted_result,
            error: redacted_error.map(|v| v.to_string()),
            latency_ms: elapsed_ms(&start),
            redactions_applied,
            policy_decision_id: Some(decision_record.id),
            pending_confirmation_id: None,
            confirmation_prompt: None,
        })
    }

    /// Resumes a `tool_execution_id` left `AWAITING_CONFIRMATION` by a prior
    /// `invoke()` call, walking it through
    /// `CONFIRMED -> RUNNING -> SUCCEEDED/FAILED` on the same row instead of
    /// reserving a new one (spec.md §4.E / §4.G step 5, §8 scenario 2).
    /// Registry lookup, scope check, argument validation, idempotency
    /// reservation, and policy evaluation all already ran for this row when
    /// it was first requested, so this only covers the tail of the pipeline.
    pub async fn resume_confirmed(
        &self,
        execution_id: ToolExecutionId,
        user_id: UserId,
        session_id: SessionId,
        args: Value,
    ) -> Result<ToolResult, AgentCoreError> {
        let start = Instant::now();

        let Some(execution) = self
            .store
            .get_tool_execution(execution_id)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?
        else {
            return Ok(ToolResult::error("UNKNOWN_EXECUTION", elapsed_ms(&start)));
        };
        if execution.user_id != user_id || execution.session_id != session_id {
            return Ok(ToolResult::error("EXECUTION_MISMATCH", elapsed_ms(&start)));
        }
        let Some(entry) = lookup(&execution.tool_name) else {
            return Ok(ToolResult::error("UNKNOWN_TOOL", elapsed_ms(&start)));
        };

        let confirmed = self
            .store
            .transition_tool_execution(
                execution.id,
                ToolExecutionStatus::AwaitingConfirmation,
                ToolExecutionStatus::Confirmed,
                None,
                None,
                None,
                None,
            )
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?;
        if !confirmed {
            return Ok(ToolResult::error("NOT_AWAITING_CONFIRMATION", elapsed_ms(&start)));
        }

        let started_at = Utc::now();
        self.store
            .transition_tool_execution(
                execution.id,
                ToolExecutionStatus::Confirmed,
                ToolExecutionStatus::Running,
                None,
                None,
                Some(started_at),
                None,
            )
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?;

        let ctx = ToolContext {
            user_id,
            session_id,
            memory: self.memory.clone(),
        };
        let invocation = entry.handler.invoke(&ctx, args).await;
        let finished_at = Utc::now();

        let (redacted_result, redacted_error, redactions_applied, status, tool_call_status) =
            match invocation {
                Ok(value) => {
                    let redacted = agentcore_redact::redact(&value);
                    (
                        Some(redacted.value),
                        None,
                        redacted.redacted_paths,
                        ToolExecutionStatus::Succeeded,
                        ToolCallStatus::Ok,
                    )
                }
                Err(e) => {
                    let err_value = serde_json::json!({ "message": e.to_string() });
                    let redacted = agentcore_redact::redact(&err_value);
                    (None, Some(redacted.value), redacted.redacted_paths, ToolExecutionStatus::Failed, ToolCallStatus::Error)
                }
            };

        self.store
            .transition_tool_execution(
                execution.id,
                ToolExecutionStatus::Running,
                status,
                redacted_result.as_ref(),
                redacted_error.as_ref(),
                None,
                Some(finished_at),
            )
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?;
        self.record_call(session_id, &execution.tool_name, tool_call_status, &start)
            .await?;

        Ok(ToolResult {
            status: if status == ToolExecutionStatus::Succeeded {
                ToolResultStatus::Succeeded
            } else {
                ToolResultStatus::Error
            },
            data: redacted_result,
            error: redacted_error.map(|v| v.to_string()),
            latency_ms: elapsed_ms(&start),
            redactions_applied,
            policy_decision_id: None,
            pending_confirmation_id: None,
            confirmation_prompt: None,
        })
    }

    async fn record_call(
        &self,
        session_id: SessionId,
        tool_name: &str,
        status: ToolCallStatus,
        start: &Instant,
    ) -> Result<(), AgentCoreError> {
        let call = ToolCall {
            id: ToolCallId::new(),
            session_id,
            tool_name: tool_name.to_string(),
            status,
            latency_ms: elapsed_ms(start),
            created_at: Utc::now(),
        };
        self.store
            .record_tool_call(&call)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))
    }
}

fn elapsed_ms(start: &Instant) -> i64 {
    start.elapsed().as_millis() as i64
}

fn guard_reason(rejection: GuardRejection) -> &'static str {
    match rejection {
        GuardRejection::RateLimited => "RATE_LIMITED",
        GuardRejection::LoopBroken => "LOOP_BROKEN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_memory::{config::MemoryStoreConfig, embedding::LocalEmbeddingProvider, vector::SqliteVectorIndex, MemoryStore};
    use agentcore_types::{Environment, Session};

    struct Harness {
        store: Arc<Store>,
        runtime: ToolRuntime,
    }

    fn harness() -> Harness {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let memory = Arc::new(MemoryStore::new(
            store.clone(),
            Box::new(LocalEmbeddingProvider::new(16)),
            Box::new(SqliteVectorIndex::new(store.clone())),
            MemoryStoreConfig::default(),
            Environment::Test,
        ));
        let runtime = ToolRuntime::new(store.clone(), memory);
        Harness { store, runtime }
    }

    /// `reserve_tool_execution` carries a foreign key to `sessions`/`users`,
    /// so every direct `invoke()` call in these tests seeds both first.
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

    fn req(
        session_id: SessionId,
        user_id: UserId,
        tool_name: &str,
        args: Value,
        scopes: &[&str],
    ) -> InvokeRequest {
        InvokeRequest {
            user_id,
            session_id,
            effective_scopes: scopes.iter().map(|s| s.to_string()).collect(),
            tool_name: tool_name.to_string(),
            args,
            idempotency_key: None,
            target_entity: "widget-1".to_string(),
            intent_summary: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn low_risk_read_succeeds_immediately() {
        let h = harness();
        let (session_id, user_id) = (SessionId::new(), UserId::new());
        seed(&h.store, session_id, user_id).await;
        let result = h
            .runtime
            .invoke(req(session_id, user_id, "get_system_info", serde_json::json!({}), &["system:read"]))
            .await
            .unwrap();
        assert_eq!(result.status, ToolResultStatus::Succeeded);
    }

    #[tokio::test]
    async fn missing_scope_is_denied() {
        let h = harness();
        let (session_id, user_id) = (SessionId::new(), UserId::new());
        seed(&h.store, session_id, user_id).await;
        let result = h
            .runtime
            .invoke(req(session_id, user_id, "get_system_info", serde_json::json!({}), &[]))
            .await
            .unwrap();
        assert_eq!(result.status, ToolResultStatus::Denied);
        assert_eq!(result.error.as_deref(), Some("SCOPE_MISSING"));
    }

    #[tokio::test]
    async fn unknown_tool_is_denied() {
        let h = harness();
        let (session_id, user_id) = (SessionId::new(), UserId::new());
        seed(&h.store, session_id, user_id).await;
        let result = h
            .runtime
            .invoke(req(session_id, user_id, "not_a_real_tool", serde_json::json!({}), &["anything"]))
            .await
            .unwrap();
        assert_eq!(result.status, ToolResultStatus::Denied);
        assert_eq!(result.error.as_deref(), Some("UNKNOWN_TOOL"));
    }

    #[tokio::test]
    async fn destructive_tool_needs_confirmation() {
        let h = harness();
        let (session_id, user_id) = (SessionId::new(), UserId::new());
        seed(&h.store, session_id, user_id).await;
        let result = h
            .runtime
            .invoke(req(
                session_id,
                user_id,
                "delete_file",
                serde_json::json!({"path": "/tmp/does-not-matter"}),
                &["files:write"],
            ))
            .await
            .unwrap();
        assert_eq!(result.status, ToolResultStatus::NeedsConfirmation);
        assert!(result.pending_confirmation_id.is_some());
        assert!(result.confirmation_prompt.is_some());
    }

    #[tokio::test]
    async fn repeated_idempotency_key_returns_cached_result() {
        let h = harness();
        let user_id = UserId::new();
        let session_id = SessionId::new();
        seed(&h.store, session_id, user_id).await;

        let mut first_request = req(session_id, user_id, "get_system_info", serde_json::json!({}), &["system:read"]);
        first_request.idempotency_key = Some("fixed-key".to_string());
        let first = h.runtime.invoke(first_request).await.unwrap();
        assert_eq!(first.status, ToolResultStatus::Succeeded);

        let mut second_request = req(session_id, user_id, "get_system_info", serde_json::json!({}), &["system:read"]);
        second_request.idempotency_key = Some("fixed-key".to_string());
        let second = h.runtime.invoke(second_request).await.unwrap();

        assert_eq!(second.status, ToolResultStatus::Succeeded);
        assert_eq!(first.data, second.data);
    }

    #[tokio::test]
    async fn resume_confirmed_walks_execution_through_confirmed_running_succeeded() {
        let h = harness();
        let (session_id, user_id) = (SessionId::new(), UserId::new());
        seed(&h.store, session_id, user_id).await;
        let args = serde_json::json!({"path": "/tmp/does-not-matter"});

        let first = h
            .runtime
            .invoke(req(session_id, user_id, "delete_file", args.clone(), &["files:write"]))
            .await
            .unwrap();
        let execution_id = h
            .store
            .tool_executions_for_session(session_id)
            .await
            .unwrap()
            .into_iter()
            .next()
            .unwrap()
            .id;
        assert_eq!(first.status, ToolResultStatus::NeedsConfirmation);

        let resumed = h
            .runtime
            .resume_confirmed(execution_id, user_id, session_id, args)
            .await
            .unwrap();
        assert_eq!(resumed.status, ToolResultStatus::Succeeded);

        let execution = h.store.get_tool_execution(execution_id).await.unwrap().unwrap();
        assert_eq!(execution.status, ToolExecutionStatus::Succeeded);
    }

    #[tokio::test]
    async fn resume_confirmed_rejects_an_execution_not_awaiting_confirmation() {
        let h = harness();
        let (session_id, user_id) = (SessionId::new(), UserId::new());
        seed(&h.store, session_id, user_id).await;
        let first = h
            .runtime
            .invoke(req(session_id, user_id, "get_system_info", serde_json::json!({}), &["system:read"]))
            .await
            .unwrap();
        assert_eq!(first.status, ToolResultStatus::Succeeded);
        let execution_id = h
            .store
            .tool_executions_for_session(session_id)
            .await
            .unwrap()
            .into_iter()
            .next()
            .unwrap()
            .id;

        let result = h
            .runtime
            .resume_confirmed(execution_id, user_id, session_id, serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result.status, ToolResultStatus::Error);
        assert_eq!(result.error.as_deref(), Some("NOT_AWAITING_CONFIRMATION"));
    }
}
