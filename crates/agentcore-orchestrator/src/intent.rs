//! Intent Parser contract (spec.md §4.J / §6) and its two implementations:
//! `LlmIntentParser` (the real, out-of-scope LLM call) and
//! `RuleBasedIntentParser` (deterministic keyword/regex extraction used in
//! `test`/`development` environments).

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::catalog::{IntentSpec, UNKNOWN_INTENT};

#[derive(Debug, Clone)]
pub struct Intent {
    pub name: String,
    pub slots: Value,
    pub confidence: f32,
    pub needs_clarification: bool,
    pub clarifying_question: Option<String>,
}

impl Intent {
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN_INTENT.to_string(),
            slots: json!({}),
            confidence: 0.0,
            needs_clarification: true,
            clarifying_question: Some("I didn't understand that. Could you rephrase?".to_string()),
        }
    }

    /// Post-validation against the catalog (spec.md §4.I step 5): any
    /// required slot the parser didn't already flag as missing forces
    /// `needs_clarification`.
    pub fn post_validate(mut self, spec: Option<&IntentSpec>) -> Self {
        let Some(spec) = spec else {
            self.needs_clarification = true;
            self.clarifying_question.get_or_insert_with(|| {
                "I'm not sure what you'd like me to do.".to_string()
            });
            return self;
        };
        let missing: Vec<&str> = spec
            .required_slots
            .iter()
            .filter(|slot| self.slots.get(slot).and_then(Value::as_str).unwrap_or("").is_empty())
            .copied()
            .collect();
        if !missing.is_empty() {
            self.needs_clarification = true;
            self.clarifying_question.get_or_insert_with(|| {
                format!("Can you tell me the {}?", missing.join(", "))
            });
        }
        self
    }
}

#[async_trait]
pub trait IntentParser: Send + Sync {
    /// `catalog` is passed as the list of known intent names; `context_str`
    /// is the assembled conversation/memory context (spec.md §6).
    async fn parse(
        &self,
        catalog: &[IntentSpec],
        utterance: &str,
        context_str: &str,
    ) -> Result<Intent, agentcore_types::AgentCoreError>;
}

/// The real intent parser: an external LLM call constrained to emit JSON
/// matching the fixed `{name, slots, confidence, needs_clarification,
/// clarifying_question?}` schema (spec.md §6). Wired here as a trait object
/// so a real provider can be swapped in without touching the Orchestrator,
/// mirroring the teacher's inference-provider abstraction.
pub struct LlmIntentParser {
    endpoint: String,
}

impl LlmIntentParser {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into() }
    }
}

#[async_trait]
impl IntentParser for LlmIntentParser {
    async fn parse(
        &self,
        _catalog: &[IntentSpec],
        _utterance: &str,
        _context_str: &str,
    ) -> Result<Intent, agentcore_types::AgentCoreError> {
        Err(agentcore_types::AgentCoreError::Internal(format!(
            "LlmIntentParser is a stand-in; no LLM endpoint wired at {}",
            self.endpoint
        )))
    }
}

static SLOT_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("path", Regex::new(r#"(?i)(?:path|file|directory)\s*[:=]?\s*"?([^\s"]+)"?"#).unwrap()),
        ("title", Regex::new(r#"(?i)(?:titled?|called)\s*[:=]?\s*"([^"]+)""#).unwrap()),
        ("query", Regex::new(r#"(?i)(?:search(?:\s+for)?|look\s+up)\s+(.+)$"#).unwrap()),
        ("content", Regex::new(r#"(?i)remember\s+(?:that\s+)?(.+)$"#).unwrap()),
        ("command", Regex::new(r#"(?i)run\s+(?:command\s+)?"?([^\s"]+)"?"#).unwrap()),
        ("to", Regex::new(r#"(?i)(?:to|email)\s+([\w.+-]+@[\w.-]+)"#).unwrap()),
        ("subject", Regex::new(r#"(?i)subject\s*[:=]?\s*"([^"]+)""#).unwrap()),
    ]
});

/// Deterministic keyword/regex slot extraction used for tests and for the
/// `test`/`development` environment, avoiding any network dependency
/// (SPEC_FULL.md 4.J).
pub struct RuleBasedIntentParser;

impl RuleBasedIntentParser {
    pub fn new() -> Self {
        Self
    }

    fn classify(utterance: &str) -> &'static str {
        let lower = utterance.to_lowercase();
        if lower.contains("delete") && lower.contains("file") {
            "delete_file"
        } else if lower.contains("list") && (lower.contains("file") || lower.contains("directory")) {
            "list_files"
        } else if lower.contains("calendar") || lower.contains("event") {
            "get_calendar_events"
        } else if lower.contains("email") || lower.contains("send") && lower.contains("to") {
            "send_email"
        } else if lower.contains("task") || lower.contains("todo") || lower.contains("reminder") {
            "create_task"
        } else if lower.contains("system info") || lower.contains("host info") || lower.contains("uname") {
            "get_system_info"
        } else if lower.contains("run") && (lower.contains("command") || lower.contains("execute")) {
            "run_system_command"
        } else if lower.contains("search") || lower.contains("look up") {
            "search_web"
        } else if lower.contains("remember") {
            "remember"
        } else {
            UNKNOWN_INTENT
        }
    }

    fn extract_slots(utterance: &str, spec: Option<&IntentSpec>) -> Value {
        let mut slots = serde_json::Map::new();
        let Some(spec) = spec else {
            return Value::Object(slots);
        };
        for (slot, pattern) in SLOT_PATTERNS.iter() {
            if !spec.required_slots.contains(slot) {
                continue;
            }
            if let Some(captures) = pattern.captures(utterance) {
                if let Some(value) = captures.get(1) {
                    slots.insert(slot.to_string(), json!(value.as_str().trim()));
                }
            }
        }
        if spec.name == "get_calendar_events" {
            slots.entry("from".to_string()).or_insert(json!("today"));
            slots.entry("to".to_string()).or_insert(json!("today"));
        }
        Value::Object(slots)
    }
}

impl Default for RuleBasedIntentParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IntentParser for RuleBasedIntentParser {
    async fn parse(
        &self,
        catalog: &[IntentSpec],
        utterance: &str,
        _context_str: &str,
    ) -> Result<Intent, agentcore_types::AgentCoreError> {
        let name = Self::classify(utterance);
        if name == UNKNOWN_INTENT {
            return Ok(Intent::unknown());
        }
        let spec = catalog.iter().find(|s| s.name == name);
        let slots = Self::extract_slots(utterance, spec);
        Ok(Intent {
            name: name.to_string(),
            slots,
            confidence: 0.8,
            needs_clarification: false,
            clarifying_question: None,
        }
        .post_validate(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CATALOG;

    #[tokio::test]
    async fn classifies_delete_file_and_extracts_path() {
        let parser = RuleBasedIntentParser::new();
        let intent = parser
            .parse(&CATALOG, "please delete file /tmp/notes.txt", "")
            .await
            .unwrap();
        assert_eq!(intent.name, "delete_file");
        assert_eq!(intent.slots["path"], json!("/tmp/notes.txt"));
        assert!(!intent.needs_clarification);
    }

    #[tokio::test]
    async fn missing_required_slot_forces_clarification() {
        let parser = RuleBasedIntentParser::new();
        let intent = parser.parse(&CATALOG, "send an email", "").await.unwrap();
        assert_eq!(intent.name, "send_email");
        assert!(intent.needs_clarification);
        assert!(intent.clarifying_question.is_some());
    }

    #[tokio::test]
    async fn unrecognized_utterance_is_unknown() {
        let parser = RuleBasedIntentParser::new();
        let intent = parser.parse(&CATALOG, "tell me a joke", "").await.unwrap();
        assert_eq!(intent.name, UNKNOWN_INTENT);
        assert!(intent.needs_clarification);
    }
}
