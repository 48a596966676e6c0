//! Built-in handlers, enough to exercise every policy rule and every
//! end-to-end scenario in spec.md §8. Third-party calendar/email/search
//! backends are out of scope (spec.md §1); these handlers act against a
//! deterministic in-process surface instead, matching the teacher's pattern
//! of a `NoOpVectorDatabase`-style stand-in for an unconfigured backend.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use agentcore_types::{ActionScope, ActionType, MemoryType, Sensitivity, ToolCategory};

use crate::{ToolContext, ToolEntry, ToolHandler, ToolHandlerError, ToolSpec};

pub fn all() -> Vec<ToolEntry> {
    vec![
        entry(get_calendar_events_spec(), Arc::new(GetCalendarEvents)),
        entry(send_email_spec(), Arc::new(SendEmail)),
        entry(list_files_spec(), Arc::new(ListFiles)),
        entry(delete_file_spec(), Arc::new(DeleteFile)),
        entry(create_task_spec(), Arc::new(CreateTask)),
        entry(get_system_info_spec(), Arc::new(GetSystemInfo)),
        entry(run_system_command_spec(), Arc::new(RunSystemCommand)),
        entry(search_web_spec(), Arc::new(SearchWeb)),
        entry(remember_spec(), Arc::new(Remember)),
    ]
}

fn entry(spec: ToolSpec, handler: Arc<dyn ToolHandler>) -> ToolEntry {
    ToolEntry { spec, handler }
}

fn arg_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolHandlerError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolHandlerError::InvalidArgs(format!("missing string field `{key}`")))
}

// -- get_calendar_events ----------------------------------------------------

fn get_calendar_events_spec() -> ToolSpec {
    ToolSpec {
        name: "get_calendar_events",
        description: "List calendar events in a time range",
        category: ToolCategory::Calendar,
        args_schema: json!({
            "type": "object",
            "properties": {
                "from": {"type": "string"},
                "to": {"type": "string"}
            },
            "required": ["from", "to"]
        }),
        side_effects: false,
        external_communication: false,
        destructive: false,
        default_action_type: ActionType::Read,
        default_sensitivity: Sensitivity::Low,
        default_scope: ActionScope::Single,
        required_scope: "calendar:read",
    }
}

struct GetCalendarEvents;

#[async_trait]
impl ToolHandler for GetCalendarEvents {
    async fn invoke(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolHandlerError> {
        let from = arg_str(&args, "from")?;
        let to = arg_str(&args, "to")?;
        Ok(json!({ "events": [], "from": from, "to": to }))
    }
}

// -- send_email -------------------------------------------------------------

fn send_email_spec() -> ToolSpec {
    ToolSpec {
        name: "send_email",
        description: "Send an email to a recipient",
        category: ToolCategory::Email,
        args_schema: json!({
            "type": "object",
            "properties": {
                "to": {"type": "string"},
                "subject": {"type": "string"},
                "body": {"type": "string"}
            },
            "required": ["to", "subject", "body"]
        }),
        side_effects: true,
        external_communication: true,
        destructive: false,
        default_action_type: ActionType::Write,
        default_sensitivity: Sensitivity::Medium,
        default_scope: ActionScope::Single,
        required_scope: "email:send",
    }
}

struct SendEmail;

#[async_trait]
impl ToolHandler for SendEmail {
    async fn invoke(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolHandlerError> {
        let to = arg_str(&args, "to")?;
        let subject = arg_str(&args, "subject")?;
        Ok(json!({ "status": "queued", "to": to, "subject": subject }))
    }
}

// -- list_files ---------------------------------------------------------

fn list_files_spec() -> ToolSpec {
    ToolSpec {
        name: "list_files",
        description: "List files under a directory",
        category: ToolCategory::Files,
        args_schema: json!({
            "type": "object",
            "properties": { "path": {"type": "string"} },
            "required": ["path"]
        }),
        side_effects: false,
        external_communication: false,
        destructive: false,
        default_action_type: ActionType::Read,
        default_sensitivity: Sensitivity::Low,
        default_scope: ActionScope::Single,
        required_scope: "files:read",
    }
}

struct ListFiles;

#[async_trait]
impl ToolHandler for ListFiles {
    async fn invoke(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolHandlerError> {
        let path = arg_str(&args, "path")?;
        let entries = std::fs::read_dir(path)
            .map_err(|e| ToolHandlerError::Failed(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        Ok(json!({ "path": path, "entries": entries }))
    }
}

// -- delete_file --------------------------------------------------------

fn delete_file_spec() -> ToolSpec {
    ToolSpec {
        name: "delete_file",
        description: "Delete a file",
        category: ToolCategory::Files,
        args_schema: json!({
            "type": "object",
            "properties": { "path": {"type": "string"} },
            "required": ["path"]
        }),
        side_effects: true,
        external_communication: false,
        destructive: true,
        default_action_type: ActionType::Delete,
        default_sensitivity: Sensitivity::High,
        default_scope: ActionScope::Single,
        required_scope: "files:write",
    }
}

struct DeleteFile;

#[async_trait]
impl ToolHandler for DeleteFile {
    async fn invoke(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolHandlerError> {
        let path = arg_str(&args, "path")?;
        std::fs::remove_file(path).map_err(|e| ToolHandlerError::Failed(e.to_string()))?;
        Ok(json!({ "deleted": path }))
    }
}

// -- create_task ----------------------------------------------------------

fn create_task_spec() -> ToolSpec {
    ToolSpec {
        name: "create_task",
        description: "Create a task",
        category: ToolCategory::Tasks,
        args_schema: json!({
            "type": "object",
            "properties": { "title": {"type": "string"} },
            "required": ["title"]
        }),
        side_effects: true,
        external_communication: false,
        destructive: false,
        default_action_type: ActionType::Write,
        default_sensitivity: Sensitivity::Low,
        default_scope: ActionScope::Single,
        required_scope: "tasks:write",
    }
}

struct CreateTask;

#[async_trait]
impl ToolHandler for CreateTask {
    async fn invoke(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolHandlerError> {
        let title = arg_str(&args, "title")?;
        Ok(json!({ "task_id": uuid::Uuid::new_v4().to_string(), "title": title }))
    }
}

// -- get_system_info ------------------------------------------------------

fn get_system_info_spec() -> ToolSpec {
    ToolSpec {
        name: "get_system_info",
        description: "Report basic host information",
        category: ToolCategory::System,
        args_schema: json!({ "type": "object", "properties": {} }),
        side_effects: false,
        external_communication: false,
        destructive: false,
        default_action_type: ActionType::Read,
        default_sensitivity: Sensitivity::Low,
        default_scope: ActionScope::Single,
        required_scope: "system:read",
    }
}

struct GetSystemInfo;

#[async_trait]
impl ToolHandler for GetSystemInfo {
    async fn invoke(&self, _ctx: &ToolContext, _args: Value) -> Result<Value, ToolHandlerError> {
        Ok(json!({ "os": std::env::consts::OS, "arch": std::env::consts::ARCH }))
    }
}

// -- run_system_command -----------------------------------------------------

fn run_system_command_spec() -> ToolSpec {
    ToolSpec {
        name: "run_system_command",
        description: "Execute a system command",
        category: ToolCategory::System,
        args_schema: json!({
            "type": "object",
            "properties": {
                "command": {"type": "string"},
                "args": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["command"]
        }),
        side_effects: true,
        external_communication: false,
        destructive: false,
        default_action_type: ActionType::Execute,
        default_sensitivity: Sensitivity::High,
        default_scope: ActionScope::Single,
        required_scope: "system:execute",
    }
}

struct RunSystemCommand;

#[async_trait]
impl ToolHandler for RunSystemCommand {
    async fn invoke(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolHandlerError> {
        let command = arg_str(&args, "command")?;
        let extra_args: Vec<String> = args
            .get("args")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let output = tokio::process::Command::new(command)
            .args(&extra_args)
            .output()
            .await
            .map_err(|e| ToolHandlerError::Failed(e.to_string()))?;

        Ok(json!({
            "exit_code": output.status.code(),
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
        }))
    }
}

// -- search_web -----------------------------------------------------------

fn search_web_spec() -> ToolSpec {
    ToolSpec {
        name: "search_web",
        description: "Search the web",
        category: ToolCategory::Web,
        args_schema: json!({
            "type": "object",
            "properties": { "query": {"type": "string"} },
            "required": ["query"]
        }),
        side_effects: false,
        // Retrieval, not communication — spec.md SPEC_FULL.md 4.C is explicit
        // that this is `false` even though the tool reaches the network.
        external_communication: false,
        destructive: false,
        default_action_type: ActionType::Read,
        default_sensitivity: Sensitivity::Low,
        default_scope: ActionScope::Single,
        required_scope: "web:search",
    }
}

struct SearchWeb;

#[async_trait]
impl ToolHandler for SearchWeb {
    async fn invoke(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolHandlerError> {
        let query = arg_str(&args, "query")?;
        Ok(json!({ "query": query, "results": [] }))
    }
}

// -- remember ---------------------------------------------------------------

fn remember_spec() -> ToolSpec {
    ToolSpec {
        name: "remember",
        description: "Save a fact to long-term memory",
        category: ToolCategory::Memory,
        args_schema: json!({
            "type": "object",
            "properties": { "content": {"type": "string"} },
            "required": ["content"]
        }),
        side_effects: true,
        external_communication: false,
        destructive: false,
        default_action_type: ActionType::Write,
        default_sensitivity: Sensitivity::Low,
        default_scope: ActionScope::Single,
        required_scope: "memory:write",
    }
}

struct Remember;

#[async_trait]
impl ToolHandler for Remember {
    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolHandlerError> {
        let content = arg_str(&args, "content")?;
        let id = ctx
            .memory
            .write(
                ctx.user_id,
                Some(ctx.session_id),
                MemoryType::Fact,
                "remember_tool",
                content,
                json!({}),
                None,
            )
            .await
            .map_err(|e| ToolHandlerError::Failed(e.to_string()))?;
        Ok(json!({ "memory_id": id.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup;

    #[test]
    fn registry_contains_all_nine_built_ins() {
        let names = [
            "get_calendar_events",
            "send_email",
            "list_files",
            "delete_file",
            "create_task",
            "get_system_info",
            "run_system_command",
            "search_web",
            "remember",
        ];
        for name in names {
            assert!(lookup(name).is_some(), "missing tool {name}");
        }
        assert!(lookup("nonexistent_tool").is_none());
    }

    #[test]
    fn delete_file_is_flagged_destructive() {
        let entry = lookup("delete_file").unwrap();
        assert!(entry.spec.destructive);
        assert_eq!(entry.spec.default_action_type, ActionType::Delete);
    }

    #[test]
    fn search_web_is_not_external_communication() {
        let entry = lookup("search_web").unwrap();
        assert!(!entry.spec.external_communication);
    }
}
