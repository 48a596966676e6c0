//! The Planner: a pure function over `(Intent, Catalog)` producing a plan
//! with at most one step (spec.md §4.J — multi-step plans are out of scope
//! for the initial core).

use serde_json::Value;

use crate::catalog::IntentSpec;
use crate::intent::Intent;

#[derive(Debug, Clone)]
pub struct PlanStep {
    pub tool_name: String,
    pub args: Value,
    pub intent_summary: String,
}

#[derive(Debug, Clone)]
pub enum Plan {
    /// Intent resolved to exactly one actionable tool call.
    Step(PlanStep),
    /// Unknown intent, or required slots missing — no tool is invoked.
    Clarify { question: String },
}

/// `None` catalog lookup or `needs_clarification` both yield `Plan::Clarify`;
/// otherwise the intent's slots become the single step's args verbatim.
pub fn plan(intent: &Intent, spec: Option<&IntentSpec>) -> Plan {
    if intent.needs_clarification || spec.is_none() {
        let question = intent
            .clarifying_question
            .clone()
            .unwrap_or_else(|| "Could you clarify what you'd like me to do?".to_string());
        return Plan::Clarify { question };
    }
    let spec = spec.expect("checked above");
    Plan::Step(PlanStep {
        tool_name: spec.tool_name.to_string(),
        args: intent.slots.clone(),
        intent_summary: format!("user intent `{}`", intent.name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::lookup;
    use serde_json::json;

    #[test]
    fn resolved_intent_becomes_single_step() {
        let intent = Intent {
            name: "create_task".to_string(),
            slots: json!({"title": "buy milk"}),
            confidence: 0.9,
            needs_clarification: false,
            clarifying_question: None,
        };
        let spec = lookup("create_task");
        match plan(&intent, spec) {
            Plan::Step(step) => {
                assert_eq!(step.tool_name, "create_task");
                assert_eq!(step.args["title"], json!("buy milk"));
            }
            other => panic!("expected a step, got {other:?}"),
        }
    }

    #[test]
    fn clarification_needed_yields_no_step() {
        let intent = Intent::unknown();
        assert!(matches!(plan(&intent, None), Plan::Clarify { .. }));
    }
}
