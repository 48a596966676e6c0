//! Persisted entities. See SPEC_FULL.md §3 for the authoritative shapes.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{
    ConfirmationId, MemoryEventId, MemoryId, MessageId, PolicyDecisionId, SessionId,
    ToolCallId, ToolExecutionId, UserId,
};

/// Deployment environment, read from `AGENTCORE_ENV`. `Test` disables vector
/// search in the Memory Store (SPEC_FULL.md 4.B) in favor of a deterministic
/// recency fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Test,
    Development,
    #[default]
    Production,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: Option<String>,
    pub scopes: HashSet<String>,
    pub settings: Value,
    pub is_superuser: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub scopes_override: Option<HashSet<String>>,
}

impl Session {
    /// `now < expires_at && revoked_at == null`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at.map(|exp| now < exp).unwrap_or(true)
    }

    /// `scopes_override ?? user.scopes`.
    pub fn effective_scopes<'a>(&'a self, user: &'a User) -> &'a HashSet<String> {
        self.scopes_override.as_ref().unwrap_or(&user.scopes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Voice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageStatus {
    Created,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub role: MessageRole,
    pub content: String,
    pub modality: Modality,
    pub status: MessageStatus,
    pub idempotency_key: Option<String>,
    pub trace_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The `ToolExecution` state machine. Transitions follow spec.md §3 exactly,
/// with an additive `Consumed` state used only by the Confirmation Manager's
/// reservation semantics (spec.md §4.E); it is reachable from `Confirmed`'s
/// sibling status on the owning `Confirmation`, never from `ToolExecution`
/// itself, so it does not appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ToolExecutionStatus {
    Requested,
    PolicyDenied,
    AwaitingConfirmation,
    Confirmed,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Expired,
}

impl ToolExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::PolicyDenied
                | Self::Succeeded
                | Self::Failed
                | Self::Cancelled
                | Self::Expired
        )
    }

    /// Legal transitions per spec.md §3.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ToolExecutionStatus::*;
        matches!(
            (self, next),
            (Requested, PolicyDenied)
                | (Requested, AwaitingConfirmation)
                | (Requested, Running)
                | (AwaitingConfirmation, Confirmed)
                | (AwaitingConfirmation, Cancelled)
                | (AwaitingConfirmation, Expired)
                | (Confirmed, Running)
                | (Running, Succeeded)
                | (Running, Failed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    pub id: ToolExecutionId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub tool_name: String,
    pub input: Value,
    pub status: ToolExecutionStatus,
    pub idempotency_key: String,
    pub result: Option<Value>,
    pub error: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub trace_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit row. Distinct from `ToolExecution`: one row per Tool
/// Runtime invocation, including guard rejections (spec.md §4.F/§4.G, see
/// SPEC_FULL.md 4.G for the grounding of this table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: ToolCallId,
    pub session_id: SessionId,
    pub tool_name: String,
    pub status: ToolCallStatus,
    pub latency_ms: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfirmationStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
    /// Additive (SPEC_FULL.md 4.E): an `Accepted` confirmation that has been
    /// spent by a one-shot reservation match in the Tool Runtime.
    Consumed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
    pub id: ConfirmationId,
    pub tool_execution_id: ToolExecutionId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub status: ConfirmationStatus,
    pub prompt: String,
    pub required_phrase: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyDecisionKind {
    Allow,
    AllowWithConfirmation,
    Escalate,
    Deny,
}

/// Tool Registry vocabulary (spec.md §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Calendar,
    Email,
    Files,
    Tasks,
    System,
    Web,
    Memory,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    Read,
    Write,
    Execute,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionScope {
    Single,
    Batch,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecisionRecord {
    pub id: PolicyDecisionId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub tool_name: String,
    pub decision: PolicyDecisionKind,
    pub risk_score: u8,
    pub reason_code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemoryType {
    Fact,
    Preference,
    Task,
    Summary,
    Contact,
    Project,
    Note,
    Document,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: MemoryId,
    pub user_id: UserId,
    pub session_id: Option<SessionId>,
    pub r#type: MemoryType,
    pub source: String,
    pub content: String,
    pub content_hash: String,
    pub embedding: Vec<f32>,
    pub metadata: Value,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A retrieved memory with its similarity score attached (not persisted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMemory {
    #[serde(flatten)]
    pub memory: Memory,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemoryEventType {
    Created,
    Updated,
    Deleted,
    Retrieved,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
    pub id: MemoryEventId,
    pub user_id: UserId,
    pub memory_id: MemoryId,
    pub event_type: MemoryEventType,
    pub actor: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_execution_legal_transitions() {
        use ToolExecutionStatus::*;
        assert!(Requested.can_transition_to(Running));
        assert!(Requested.can_transition_to(AwaitingConfirmation));
        assert!(AwaitingConfirmation.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Running));
        assert!(Running.can_transition_to(Succeeded));
        assert!(!Succeeded.can_transition_to(Running));
        assert!(!Requested.can_transition_to(Succeeded));
    }

    #[test]
    fn terminal_states_are_absorbing() {
        use ToolExecutionStatus::*;
        for s in [PolicyDenied, Succeeded, Failed, Cancelled, Expired] {
            assert!(s.is_terminal());
            for next in [Requested, PolicyDenied, AwaitingConfirmation, Confirmed, Running, Succeeded, Failed, Cancelled, Expired] {
                assert!(!s.can_transition_to(next), "{s:?} -> {next:?} should be illegal");
            }
        }
    }
}
