//! End-to-end scenarios over the full session → orchestrator → tool runtime
//! → policy → confirmation → memory pipeline, wired exactly as `main.rs`
//! wires it (in-memory store, local embeddings, rule-based intent parsing).

use std::collections::HashSet;
use std::sync::Arc;

use agentcore_memory::{config::MemoryStoreConfig, embedding::LocalEmbeddingProvider, vector::SqliteVectorIndex, MemoryStore};
use agentcore_orchestrator::intent::{IntentParser, RuleBasedIntentParser};
use agentcore_orchestrator::{Orchestrator, TurnRequest};
use agentcore_runtime::{InvokeRequest, ToolResultStatus, ToolRuntime};
use agentcore_store::Store;
use agentcore_types::{Environment, MemoryType, Modality, Session, SessionId, ToolExecutionStatus, UserId};

struct Harness {
    store: Arc<Store>,
    memory: Arc<MemoryStore>,
    runtime: Arc<ToolRuntime>,
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
    let parser: Arc<dyn IntentParser> = Arc::new(RuleBasedIntentParser::new());
    let orchestrator = Orchestrator::new(store.clone(), memory.clone(), runtime.clone(), parser);
    Harness { store, memory, runtime, orchestrator }
}

/// Sessions and tool executions both carry a foreign key to `users`, so
/// every scenario that drives the orchestrator or tool runtime directly
/// seeds both rows first, the way `main.rs`'s `turn` subcommand does.
async fn seed(store: &Store, session_id: SessionId, user_id: UserId) {
    store.ensure_user(user_id).await.unwrap();
    store
        .create_session(&Session {
            id: session_id,
            user_id,
            started_at: chrono::Utc::now(),
            expires_at: None,
            revoked_at: None,
            scopes_override: None,
        })
        .await
        .unwrap();
}

fn scopes(names: &[&str]) -> HashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn turn(session_id: SessionId, user_id: UserId, content: &str, scopes: &[&str]) -> TurnRequest {
    TurnRequest {
        session_id,
        user_id,
        content: content.to_string(),
        modality: Modality::Text,
        idempotency_key: None,
        effective_scopes: self::scopes(scopes),
    }
}

/// Scenario 1: read-only happy path.
#[tokio::test]
async fn read_only_calendar_query_succeeds() {
    let h = harness();
    let session_id = SessionId::new();
    let user_id = UserId::new();
    seed(&h.store, session_id, user_id).await;

    let response = h
        .orchestrator
        .turn(turn(session_id, user_id, "what's on my calendar today?", &["calendar:read"]))
        .await
        .unwrap();

    assert_eq!(response.assistant_text, "Done.");
    assert!(response.pending_confirmation.is_none());

    let decisions = h.store.policy_decisions_for_session(session_id).await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].decision, agentcore_types::PolicyDecisionKind::Allow);
}

/// Scenario 2: external communication requires a plain confirmation, then
/// runs. The rule-based parser has no slot pattern for `send_email`'s body,
/// so the initiating half goes straight through the Tool Runtime the way a
/// fully-slotted NLU parse would, and the resolving half is driven through
/// the Orchestrator exactly as a real follow-up utterance would be.
#[tokio::test]
async fn external_communication_confirms_then_sends() {
    let h = harness();
    let session_id = SessionId::new();
    let user_id = UserId::new();
    seed(&h.store, session_id, user_id).await;

    let initiate = h
        .runtime
        .invoke(InvokeRequest {
            user_id,
            session_id,
            effective_scopes: scopes(&["email:send"]),
            tool_name: "send_email".to_string(),
            args: serde_json::json!({
                "to": "ops@example.com",
                "subject": "status",
                "body": "all green",
            }),
            idempotency_key: None,
            target_entity: "send_email".to_string(),
            intent_summary: "send an email".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(initiate.status, ToolResultStatus::NeedsConfirmation);
    let confirmation_id = initiate.pending_confirmation_id.unwrap();

    // Seed the session with a pending confirmation the Orchestrator can see;
    // the runtime call above created the row directly, bypassing the turn
    // that would normally have preceded it.
    let pending = h
        .store
        .get_confirmation(confirmation_id, user_id, session_id)
        .await
        .unwrap()
        .expect("confirmation row exists");
    assert_eq!(pending.session_id, session_id);

    let resolved = h
        .orchestrator
        .turn(turn(session_id, user_id, "yes", &["email:send"]))
        .await
        .unwrap();

    assert!(resolved.pending_confirmation.is_none());
    assert_eq!(resolved.assistant_text, "Done.");

    // The runtime's one-shot reservation check consumes the Accepted
    // confirmation once its matching tool call actually runs.
    let confirmation = h
        .store
        .get_confirmation(confirmation_id, user_id, session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(confirmation.status, agentcore_types::ConfirmationStatus::Consumed);
}

/// Scenario 3: destructive escalation requires the exact generated phrase.
#[tokio::test]
async fn destructive_delete_escalates_and_requires_exact_phrase() {
    let h = harness();
    let session_id = SessionId::new();
    let user_id = UserId::new();
    seed(&h.store, session_id, user_id).await;

    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let first = h
        .orchestrator
        .turn(turn(
            session_id,
            user_id,
            &format!("please delete file {path}"),
            &["files:write"],
        ))
        .await
        .unwrap();
    let confirmation_id = first.pending_confirmation.as_ref().unwrap().id;
    assert!(first.assistant_text.to_uppercase().contains("CONFIRM DELETE FILE"));

    let still_pending = h
        .orchestrator
        .turn(turn(session_id, user_id, "yes delete it", &["files:write"]))
        .await
        .unwrap();
    assert!(still_pending.pending_confirmation.is_some());
    assert_eq!(still_pending.pending_confirmation.unwrap().id, confirmation_id);
    assert!(file.path().exists());

    let accepted = h
        .orchestrator
        .turn(turn(
            session_id,
            user_id,
            "CONFIRM DELETE FILE please",
            &["files:write"],
        ))
        .await
        .unwrap();
    assert!(accepted.pending_confirmation.is_none());
    assert_eq!(accepted.assistant_text, "Done.");
    assert!(!file.path().exists());
    // NamedTempFile's Drop would otherwise try to remove an already-deleted
    // file; disarm it.
    std::mem::forget(file);
}

/// Scenario 4: idempotent retry. Two turns that carry the same
/// idempotency key collapse to one user-message row and one tool
/// execution.
#[tokio::test]
async fn idempotent_retry_runs_the_tool_once() {
    let h = harness();
    let session_id = SessionId::new();
    let user_id = UserId::new();
    seed(&h.store, session_id, user_id).await;
    let content = "please create a task titled \"buy milk\"";
    let key = "retry-key-1".to_string();

    let make_request = || TurnRequest {
        session_id,
        user_id,
        content: content.to_string(),
        modality: Modality::Text,
        idempotency_key: Some(key.clone()),
        effective_scopes: scopes(&["tasks:write"]),
    };

    let first = h.orchestrator.turn(make_request()).await.unwrap();
    let second = h.orchestrator.turn(make_request()).await.unwrap();

    assert_eq!(first.assistant_text, second.assistant_text);

    let messages = h.store.recent_messages(session_id, 100).await.unwrap();
    let user_messages = messages
        .iter()
        .filter(|m| m.role == agentcore_types::MessageRole::User)
        .count();
    assert_eq!(user_messages, 1);

    let executions = h
        .store
        .recent_executions_for_tool(session_id, "create_task", 10)
        .await
        .unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ToolExecutionStatus::Succeeded);
}

/// Scenario 5: writing identical content twice under the same user yields
/// one Memory row and a [Created, Updated] event sequence.
#[tokio::test]
async fn memory_dedup_yields_one_row_and_two_events() {
    let h = harness();
    let user_id = UserId::new();

    let first_id = h
        .memory
        .write(user_id, None, MemoryType::Fact, "test", "the sky is blue", serde_json::json!({}), None)
        .await
        .unwrap();
    let second_id = h
        .memory
        .write(user_id, None, MemoryType::Fact, "test", "the sky is blue", serde_json::json!({}), None)
        .await
        .unwrap();

    assert_eq!(first_id, second_id);

    let events = h.store.events_for_memory(first_id).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, agentcore_types::MemoryEventType::Created);
    assert_eq!(events[1].event_type, agentcore_types::MemoryEventType::Updated);

    let live = h.store.list_memories(user_id, None, 10, 0).await.unwrap();
    assert_eq!(live.len(), 1);
}

/// Scenario 6: rate limiting. The eleventh call to a low-risk, frequently
/// repeated tool within the window is denied without counting toward it.
#[tokio::test]
async fn eleventh_call_in_window_is_rate_limited() {
    let h = harness();
    let session_id = SessionId::new();
    let user_id = UserId::new();
    seed(&h.store, session_id, user_id).await;

    let invoke = |h: &Harness| {
        h.runtime.invoke(InvokeRequest {
            user_id,
            session_id,
            effective_scopes: scopes(&["system:read"]),
            tool_name: "get_system_info".to_string(),
            args: serde_json::json!({}),
            idempotency_key: None,
            target_entity: "get_system_info".to_string(),
            intent_summary: "check host info".to_string(),
        })
    };

    for i in 0..10 {
        let result = invoke(&h).await.unwrap();
        assert_eq!(
            result.status,
            ToolResultStatus::Succeeded,
            "call {i} should succeed within the window"
        );
    }

    let eleventh = invoke(&h).await.unwrap();
    assert_eq!(eleventh.status, ToolResultStatus::Denied);
    assert_eq!(eleventh.error.as_deref(), Some("RATE_LIMITED"));

    let executions = h
        .store
        .recent_executions_for_tool(session_id, "get_system_info", 20)
        .await
        .unwrap();
    let succeeded = executions
        .iter()
        .filter(|e| e.status == ToolExecutionStatus::Succeeded)
        .count();
    assert_eq!(succeeded, 10);
}
