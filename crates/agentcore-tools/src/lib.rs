//! Static tool registry: `name -> (ToolSpec, handler)`, plus the built-in
//! tool set (spec.md §4.C / SPEC_FULL.md 4.C).

mod handlers;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;

use agentcore_types::{ActionScope, ActionType, Sensitivity, SessionId, ToolCategory, UserId};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolHandlerError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("handler failed: {0}")]
    Failed(String),
}

/// Per-invocation context passed to a handler. Handlers never see the raw
/// session/user records — only what they need to act.
pub struct ToolContext {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub memory: Arc<agentcore_memory::MemoryStore>,
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolHandlerError>;
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub category: ToolCategory,
    pub args_schema: Value,
    pub side_effects: bool,
    pub external_communication: bool,
    pub destructive: bool,
    pub default_action_type: ActionType,
    pub default_sensitivity: Sensitivity,
    pub default_scope: ActionScope,
    pub required_scope: &'static str,
}

pub struct ToolEntry {
    pub spec: ToolSpec,
    pub handler: Arc<dyn ToolHandler>,
}

static REGISTRY: Lazy<HashMap<&'static str, ToolEntry>> = Lazy::new(|| {
    handlers::all()
        .into_iter()
        .map(|entry| (entry.spec.name, entry))
        .collect()
});

/// Unknown names resolve to `None`, which the Tool Runtime translates to a
/// `DENY{UNKNOWN_TOOL}` result (spec.md §4.C).
pub fn lookup(name: &str) -> Option<&'static ToolEntry> {
    REGISTRY.get(name)
}

pub fn validate_args(spec: &ToolSpec, args: &Value) -> Result<(), ToolHandlerError> {
    jsonschema::validate(&spec.args_schema, args)
        .map_err(|e| ToolHandlerError::InvalidArgs(e.to_string()))
}

pub fn all_specs() -> Vec<&'static ToolSpec> {
    REGISTRY.values().map(|entry| &entry.spec).collect()
}
