//! Request/response shapes for the Turn, Session, and Memory APIs (spec.md §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use agentcore_types::{
    AgentMessage, ConfirmationId, MemoryType, PolicyDecisionRecord, SessionId, ToolCall, UserId,
};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct PendingConfirmationView {
    pub id: ConfirmationId,
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub assistant_text: String,
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_confirmation: Option<PendingConfirmationView>,
    pub request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: UserId,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
}

#[derive(Debug, Serialize)]
pub struct SessionHistoryResponse {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub messages: Vec<AgentMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_confirmation: Option<PendingConfirmationView>,
    pub tool_calls: Vec<ToolCall>,
    pub policy_decisions: Vec<PolicyDecisionRecord>,
}

#[derive(Debug, Deserialize)]
pub struct ListMemoriesQuery {
    pub r#type: Option<MemoryType>,
    #[serde(default)]
    pub q: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMemoryRequest {
    pub r#type: MemoryType,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Deserialize)]
pub struct SearchMemoriesRequest {
    pub query: String,
    pub types: Option<Vec<MemoryType>>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    pub min_score: Option<f32>,
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemoryRequest {
    pub content: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub trace_id: String,
}
