//! The Orchestrator: the per-turn pipeline invoked once per user utterance
//! (spec.md §4.I). Control flow: Message Store (record user) →
//! Confirmation Manager (resolve if pending) → Memory Store (retrieve
//! context) → Intent Parser → Planner → Tool Runtime → Message Store
//! (record assistant).

pub mod catalog;
pub mod intent;
pub mod plan;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use agentcore_confirm::{ConfirmationManager, ResolveResult};
use agentcore_memory::MemoryStore;
use agentcore_messages::MessageStore;
use agentcore_runtime::{InvokeRequest, ToolResult, ToolResultStatus, ToolRuntime};
use agentcore_store::Store;
use agentcore_types::{
    AgentCoreError, ConfirmationId, MemoryType, Modality, SessionId, UserId,
};

use crate::intent::{Intent, IntentParser};
use crate::plan::{plan, Plan};

const CONTEXT_MESSAGE_COUNT: usize = 10;
const CONTEXT_MEMORY_COUNT: usize = 5;
const CONTEXT_MEMORY_MIN_SCORE: f32 = 0.65;
const TURN_DEADLINE: Duration = Duration::from_secs(300);
const CONTEXT_MEMORY_TYPES: [MemoryType; 5] = [
    MemoryType::Fact,
    MemoryType::Preference,
    MemoryType::Task,
    MemoryType::Summary,
    MemoryType::Note,
];

#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    pub id: ConfirmationId,
    pub prompt: String,
}

#[derive(Debug, Clone)]
pub struct OrchestratorResponse {
    pub assistant_text: String,
    pub should_speak: bool,
    pub metadata: Value,
    pub pending_confirmation: Option<PendingConfirmation>,
}

pub struct TurnRequest {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub content: String,
    pub modality: Modality,
    pub idempotency_key: Option<String>,
    pub effective_scopes: std::collections::HashSet<String>,
}

pub struct Orchestrator {
    store: Arc<Store>,
    memory: Arc<MemoryStore>,
    runtime: Arc<ToolRuntime>,
    parser: Arc<dyn IntentParser>,
    session_locks: DashMap<SessionId, Arc<tokio::sync::Mutex<()>>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<Store>,
        memory: Arc<MemoryStore>,
        runtime: Arc<ToolRuntime>,
        parser: Arc<dyn IntentParser>,
    ) -> Self {
        Self {
            store,
            memory,
            runtime,
            parser,
            session_locks: DashMap::new(),
        }
    }

    fn session_lock(&self, session_id: SessionId) -> Arc<tokio::sync::Mutex<()>> {
        self.session_locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Runs one turn under the session's advisory lock and a 300 s overall
    /// deadline (spec.md §5). On deadline, any `RUNNING` execution left
    /// behind for the session is transitioned to `FAILED{reason=TIMEOUT}`.
    pub async fn turn(&self, req: TurnRequest) -> Result<OrchestratorResponse, AgentCoreError> {
        let lock = self.session_lock(req.session_id);
        let _guard = lock.lock().await;

        match tokio::time::timeout(TURN_DEADLINE, self.turn_inner(&req)).await {
            Ok(result) => result,
            Err(_) => {
                self.fail_running_executions(req.session_id, "TIMEOUT").await;
                Err(AgentCoreError::Timeout)
            }
        }
    }

    async fn fail_running_executions(&self, session_id: SessionId, reason: &str) {
        let Ok(running) = self.store.running_executions_for_session(session_id).await else {
            return;
        };
        for exec in running {
            let _ = self
                .store
                .transition_tool_execution(
                    exec.id,
                    agentcore_types::ToolExecutionStatus::Running,
                    agentcore_types::ToolExecutionStatus::Failed,
                    None,
                    Some(&json!({ "reason": reason })),
                    None,
                    Some(Utc::now()),
                )
                .await;
        }
    }

    async fn turn_inner(&self, req: &TurnRequest) -> Result<OrchestratorResponse, AgentCoreError> {
        // Step 1 is the trace id; derived deterministically so duplicate
        // submissions (same session + content) resolve to the same
        // correlated assistant reply (spec.md §4.I step 2).
        let idempotency_key = req
            .idempotency_key
            .clone()
            .unwrap_or_else(|| derive_idempotency_key(req.session_id, &req.content));
        let trace_id = idempotency_key.clone();
        tracing::debug!(session_id = %req.session_id, trace_id = %trace_id, "starting turn");

        let messages = MessageStore::new(&self.store);
        messages
            .save_user_message(
                req.session_id,
                req.user_id,
                &req.content,
                req.modality,
                Some(idempotency_key.clone()),
                Some(trace_id.clone()),
            )
            .await?;

        // Step 2: a duplicate submission (same idempotency key) with an
        // already-answered reply returns that reply unchanged.
        if let Some(existing) = messages
            .assistant_reply_for_trace(req.session_id, &trace_id)
            .await?
        {
            return Ok(OrchestratorResponse {
                assistant_text: existing.content,
                should_speak: true,
                metadata: json!({ "duplicate": true }),
                pending_confirmation: None,
            });
        }

        // Step 3: pending confirmation resolution.
        if let Some(pending) = self
            .store
            .pending_confirmation_for_session(req.session_id)
            .await
            .map_err(|e| AgentCoreError::Store(e.to_string()))?
        {
            return self
                .resolve_pending_confirmation(req, pending.id, &trace_id)
                .await;
        }

        // Step 4: context assembly.
        let context_str = self.assemble_context(req.session_id, req.user_id).await?;

        // Step 5: intent parsing, post-validated against the catalog.
        let intent = self
            .parser
            .parse(&catalog::CATALOG, &req.content, &context_str)
            .await?;
        let spec = catalog::lookup(&intent.name);
        let intent = intent.post_validate(spec);

        // Step 6: planning.
        let plan_result = plan(&intent, spec);
        let step = match plan_result {
            Plan::Clarify { question } => {
                return self.finish(req, &trace_id, question, None).await;
            }
            Plan::Step(step) => step,
        };

        // Step 7: execute plan (single step for the initial core).
        let target_entity = spec
            .map(|s| s.entity_label)
            .unwrap_or("target")
            .to_string();
        let tool_result = self
            .runtime
            .invoke(InvokeRequest {
                user_id: req.user_id,
                session_id: req.session_id,
                effective_scopes: req.effective_scopes.clone(),
                tool_name: step.tool_name,
                args: step.args,
                idempotency_key: None,
                target_entity,
                intent_summary: step.intent_summary,
            })
            .await?;

        // Step 8: summarize.
        let pending_confirmation = pending_confirmation_from(&tool_result);
        let assistant_text = summarize(&tool_result);

        // Step 9: persist assistant message; return.
        self.finish(req, &trace_id, assistant_text, pending_confirmation).await
    }

    async fn resolve_pending_confirmation(
        &self,
        req: &TurnRequest,
        confirmation_id: ConfirmationId,
        trace_id: &str,
    ) -> Result<OrchestratorResponse, AgentCoreError> {
        let confirm_mgr = ConfirmationManager::new(&self.store);
        let resolution = confirm_mgr
            .resolve(confirmation_id, req.user_id, req.session_id, &req.content)
            .await?;

        match resolution {
            ResolveResult::Accepted { tool_execution_id, args, .. } => {
                let tool_result = self
                    .runtime
                    .resume_confirmed(tool_execution_id, req.user_id, req.session_id, args)
                    .await?;
                confirm_mgr.mark_consumed(confirmation_id).await?;
                let pending_confirmation = pending_confirmation_from(&tool_result);
                let assistant_text = summarize(&tool_result);
                self.finish(req, trace_id, assistant_text, pending_confirmation).await
            }
            ResolveResult::StillPending { prompt } => {
                self.finish(
                    req,
                    trace_id,
                    prompt.clone(),
                    Some(PendingConfirmation { id: confirmation_id, prompt }),
                )
                .await
            }
            ResolveResult::Error { reason } => {
                self.finish(req, trace_id, format!("Something went wrong. {reason}"), None)
                    .await
            }
        }
    }

    async fn assemble_context(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<String, AgentCoreError> {
        let messages = MessageStore::new(&self.store)
            .recent_messages(session_id, CONTEXT_MESSAGE_COUNT)
            .await?;
        let memories = self
            .memory
            .retrieve(
                user_id,
                "",
                Some(&CONTEXT_MEMORY_TYPES),
                None,
                CONTEXT_MEMORY_COUNT,
                Some(CONTEXT_MEMORY_MIN_SCORE),
            )
            .await?;

        let mut context = String::new();
        for message in messages.iter().rev().take(3).rev() {
            context.push_str(&format!("{:?}: {}\n", message.role, message.content));
        }
        if !memories.is_empty() {
            context.push_str("Relevant memories:\n");
            for scored in &memories {
                context.push_str(&format!("- {}\n", scored.memory.content));
            }
        }
        Ok(context)
    }

    async fn finish(
        &self,
        req: &TurnRequest,
        trace_id: &str,
        assistant_text: String,
        pending_confirmation: Option<PendingConfirmation>,
    ) -> Result<OrchestratorResponse, AgentCoreError> {
        MessageStore::new(&self.store)
            .save_assistant_message(
                req.session_id,
                req.user_id,
                &assistant_text,
                req.modality,
                Some(trace_id.to_string()),
            )
            .await?;
        Ok(OrchestratorResponse {
            assistant_text,
            should_speak: true,
            metadata: json!({}),
            pending_confirmation,
        })
    }
}

fn derive_idempotency_key(session_id: SessionId, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.to_string().as_bytes());
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn pending_confirmation_from(result: &ToolResult) -> Option<PendingConfirmation> {
    match (result.pending_confirmation_id, &result.confirmation_prompt) {
        (Some(id), Some(prompt)) => Some(PendingConfirmation { id, prompt: prompt.clone() }),
        _ => None,
    }
}

/// `ToolResult` → assistant text (spec.md §4.I step 8).
fn summarize(result: &ToolResult) -> String {
    match result.status {
        ToolResultStatus::Succeeded => match result.data.as_ref().and_then(|d| d.get("message")) {
            Some(Value::String(message)) => format!("Done. {message}"),
            _ => "Done.".to_string(),
        },
        ToolResultStatus::NeedsConfirmation => result
            .confirmation_prompt
            .clone()
            .unwrap_or_else(|| "Please confirm this action.".to_string()),
        ToolResultStatus::Denied => format!(
            "I cannot do that. {}",
            result.error.clone().unwrap_or_default()
        ),
        ToolResultStatus::Error => format!(
            "Something went wrong. {}",
            result.error.clone().unwrap_or_default()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_memory::{config::MemoryStoreConfig, embedding::LocalEmbeddingProvider, vector::SqliteVectorIndex};
    use agentcore_types::{Environment, Session};

    struct Harness {
        store: Arc<Store>,
        orchestrator: Orchestrator,
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
        let runtime = Arc::new(ToolRuntime::new(store.clone(), memory.clone()));
        let parser: Arc<dyn IntentParser> = Arc::new(intent::RuleBasedIntentParser::new());
        let orchestrator = Orchestrator::new(store.clone(), memory, runtime, parser);
        Harness { store, orchestrator }
    }

    /// Every test drives `Orchestrator::turn`, which expects its session to
    /// already exist (spec.md §6: `POST /sessions` precedes a turn) — seed
    /// the user + session rows the same way that endpoint would.
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

    fn req(session_id: SessionId, user_id: UserId, content: &str, scopes: &[&str]) -> TurnRequest {
        TurnRequest {
            session_id,
            user_id,
            content: content.to_string(),
            modality: Modality::Text,
            idempotency_key: None,
            effective_scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn unrecognized_utterance_asks_for_clarification() {
        let h = harness();
        let (session_id, user_id) = (SessionId::new(), UserId::new());
        seed(&h.store, session_id, user_id).await;
        let response = h
            .orchestrator
            .turn(req(session_id, user_id, "tell me a joke", &[]))
            .await
            .unwrap();
        assert!(response.assistant_text.to_lowercase().contains("understand")
            || response.assistant_text.to_lowercase().contains("rephrase"));
        assert!(response.pending_confirmation.is_none());
    }

    #[tokio::test]
    async fn low_risk_tool_executes_and_replies_done() {
        let h = harness();
        let (session_id, user_id) = (SessionId::new(), UserId::new());
        seed(&h.store, session_id, user_id).await;
        let response = h
            .orchestrator
            .turn(req(
                session_id,
                user_id,
                "please show me the system info",
                &["system:read"],
            ))
            .await
            .unwrap();
        assert_eq!(response.assistant_text, "Done.");
    }

    #[tokio::test]
    async fn destructive_tool_surfaces_confirmation_prompt() {
        let h = harness();
        let (session_id, user_id) = (SessionId::new(), UserId::new());
        seed(&h.store, session_id, user_id).await;
        let response = h
            .orchestrator
            .turn(req(
                session_id,
                user_id,
                "delete file /tmp/does-not-matter.txt",
                &["files:write"],
            ))
            .await
            .unwrap();
        assert!(response.pending_confirmation.is_some());
    }

    #[tokio::test]
    async fn duplicate_submission_returns_same_reply() {
        let h = harness();
        let session_id = SessionId::new();
        let user_id = UserId::new();
        seed(&h.store, session_id, user_id).await;
        let first = h
            .orchestrator
            .turn(req(session_id, user_id, "please show me the system info", &["system:read"]))
            .await
            .unwrap();
        let second = h
            .orchestrator
            .turn(req(session_id, user_id, "please show me the system info", &["system:read"]))
            .await
            .unwrap();
        assert_eq!(first.assistant_text, second.assistant_text);
    }
}
