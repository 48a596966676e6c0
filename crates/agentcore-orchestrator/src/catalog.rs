//! Static Intent Catalog: one entry per built-in tool, plus an `"unknown"`
//! catch-all (SPEC_FULL.md 4.J).

use once_cell::sync::Lazy;

#[derive(Debug, Clone)]
pub struct IntentSpec {
    pub name: &'static str,
    pub required_slots: &'static [&'static str],
    pub tool_name: &'static str,
    pub category: agentcore_types::ToolCategory,
    /// Singular noun for the thing this intent acts on, fed to the Policy
    /// Engine as `target_entity` so escalation phrases read naturally
    /// ("CONFIRM DELETE FILE", not "CONFIRM DELETE DELETE_FILE").
    pub entity_label: &'static str,
}

pub static CATALOG: Lazy<Vec<IntentSpec>> = Lazy::new(|| {
    use agentcore_types::ToolCategory::*;
    vec![
        IntentSpec {
            name: "get_calendar_events",
            required_slots: &["from", "to"],
            tool_name: "get_calendar_events",
            category: Calendar,
            entity_label: "calendar",
        },
        IntentSpec {
            name: "send_email",
            required_slots: &["to", "subject", "body"],
            tool_name: "send_email",
            category: Email,
            entity_label: "recipient",
        },
        IntentSpec {
            name: "list_files",
            required_slots: &["path"],
            tool_name: "list_files",
            category: Files,
            entity_label: "files",
        },
        IntentSpec {
            name: "delete_file",
            required_slots: &["path"],
            tool_name: "delete_file",
            category: Files,
            entity_label: "file",
        },
        IntentSpec {
            name: "create_task",
            required_slots: &["title"],
            tool_name: "create_task",
            category: Tasks,
            entity_label: "task",
        },
        IntentSpec {
            name: "get_system_info",
            required_slots: &[],
            tool_name: "get_system_info",
            category: System,
            entity_label: "system",
        },
        IntentSpec {
            name: "run_system_command",
            required_slots: &["command"],
            tool_name: "run_system_command",
            category: System,
            entity_label: "command",
        },
        IntentSpec {
            name: "search_web",
            required_slots: &["query"],
            tool_name: "search_web",
            category: Web,
            entity_label: "query",
        },
        IntentSpec {
            name: "remember",
            required_slots: &["content"],
            tool_name: "remember",
            category: Memory,
            entity_label: "memory",
        },
    ]
});

pub const UNKNOWN_INTENT: &str = "unknown";

pub fn lookup(name: &str) -> Option<&'static IntentSpec> {
    CATALOG.iter().find(|spec| spec.name == name)
}
