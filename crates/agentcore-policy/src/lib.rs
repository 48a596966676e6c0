//! Deterministic, I/O-free risk policy engine. `evaluate` is a pure
//! function: identical inputs always produce identical decisions (spec.md
//! §4.D). Rule ordering is significant and intentionally not configurable —
//! later rules in `evaluate` are allowed to override earlier ones, exactly
//! as spec.md states ("destructive overrides external-comm; system-exec
//! overrides destructive").

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use agentcore_types::{ActionScope, ActionType, PolicyDecisionKind, Sensitivity, ToolCategory};

const MAX_CALLS_PER_MINUTE: u32 = 10;
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Static facts about a tool that the Policy Engine needs but does not look
/// up itself — the Tool Runtime resolves these from the Registry before
/// calling `evaluate` (spec.md §4.G step 6).
#[derive(Debug, Clone, Copy)]
pub struct ToolFlags {
    pub side_effects: bool,
    pub external_communication: bool,
    pub destructive: bool,
    pub category: ToolCategory,
}

#[derive(Debug, Clone)]
pub struct PolicyCheck {
    pub tool_name: String,
    pub tool_found: bool,
    pub flags: ToolFlags,
    pub action_type: ActionType,
    pub target_entity: String,
    pub scope: ActionScope,
    pub sensitivity: Sensitivity,
    pub intent_summary: String,
    /// Already redacted by the caller (spec.md §4.G step 6: "redact args").
    pub args_preview: Value,
}

#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub decision: PolicyDecisionKind,
    pub risk: u8,
    pub reason_code: &'static str,
    pub required_phrase: Option<String>,
    pub prompt: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

fn base_risk(sensitivity: Sensitivity, scope: ActionScope) -> u8 {
    let base: i32 = match sensitivity {
        Sensitivity::Low => 10,
        Sensitivity::Medium => 40,
        Sensitivity::High => 70,
    };
    let scope_bonus = match scope {
        ActionScope::Batch | ActionScope::All => 20,
        ActionScope::Single => 0,
    };
    (base + scope_bonus).clamp(0, 100) as u8
}

/// Implements spec.md §4.D's ten numbered steps, in file order.
pub fn evaluate(check: &PolicyCheck, now: DateTime<Utc>) -> PolicyDecision {
    // Step 1: unknown tool.
    if !check.tool_found {
        return PolicyDecision {
            decision: PolicyDecisionKind::Deny,
            risk: 100,
            reason_code: "UNKNOWN_TOOL",
            required_phrase: None,
            prompt: None,
            expires_at: None,
        };
    }

    // Step 2: initialize.
    let mut decision = PolicyDecisionKind::Allow;
    let mut reason = "STANDARD_ALLOW";
    let mut required_phrase: Option<String> = None;
    let mut prompt: Option<String> = None;

    // Step 3: base risk.
    let mut risk = base_risk(check.sensitivity, check.scope) as i32;

    // Step 4: read-only low-risk.
    if check.action_type == ActionType::Read
        && !check.flags.side_effects
        && check.sensitivity == Sensitivity::Low
    {
        risk = risk.min(10);
        decision = PolicyDecisionKind::Allow;
        reason = "LOW_RISK_READ";
    }

    // Step 5: external communication.
    if check.flags.external_communication {
        decision = PolicyDecisionKind::AllowWithConfirmation;
        risk = risk.max(60);
        reason = "EXTERNAL_COMM_CONFIRM";
        prompt = Some(format!(
            "This will contact {}. Proceed?",
            check.target_entity
        ));
    }

    // Step 6: destructive.
    if check.flags.destructive || check.action_type == ActionType::Delete {
        decision = PolicyDecisionKind::Escalate;
        risk = risk.max(85);
        reason = "DESTRUCTIVE_ACTION";
        required_phrase = Some(
            format!("CONFIRM {:?} {}", check.action_type, check.target_entity).to_uppercase(),
        );
        prompt = Some(format!(
            "This will {} {}. Say \"{}\" to proceed.",
            format!("{:?}", check.action_type).to_lowercase(),
            check.target_entity,
            required_phrase.clone().unwrap()
        ));
    }

    // Step 7: batch.
    if matches!(check.scope, ActionScope::Batch | ActionScope::All)
        && decision == PolicyDecisionKind::Allow
        && risk > 30
    {
        decision = PolicyDecisionKind::AllowWithConfirmation;
        reason = "BATCH_OPERATION_CONFIRM";
        prompt = Some(format!(
            "This will affect multiple items ({}). Proceed?",
            check.target_entity
        ));
    }

    // Step 8: system execution.
    if check.flags.category == ToolCategory::System && check.action_type == ActionType::Execute {
        decision = PolicyDecisionKind::Escalate;
        risk = 100;
        reason = "SYSTEM_EXECUTION";
        required_phrase = Some("CONFIRM SYSTEM EXECUTE".to_string());
        prompt = Some(format!(
            "This will execute a system command ({}). Say \"CONFIRM SYSTEM EXECUTE\" to proceed.",
            check.target_entity
        ));
    }

    // Step 9: clamp risk, clear stray required_phrase.
    risk = risk.clamp(0, 100);
    if decision != PolicyDecisionKind::Escalate {
        required_phrase = None;
    }

    // Step 10: expiry for interactive decisions.
    let expires_at = matches!(
        decision,
        PolicyDecisionKind::AllowWithConfirmation | PolicyDecisionKind::Escalate
    )
    .then(|| now + Duration::hours(1));

    PolicyDecision {
        decision,
        risk: risk as u8,
        reason_code: reason,
        required_phrase,
        prompt,
        expires_at,
    }
}

/// Rate-limit guard (spec.md §4.F): count of invocations in the trailing
/// 60-second window, supplied by the caller via a read-only store query.
pub fn rate_limit_exceeded(calls_in_last_60s: u32) -> bool {
    calls_in_last_60s >= MAX_CALLS_PER_MINUTE
}

/// Loop-breaker guard (spec.md §4.F): the `n` most recent invocations,
/// newest first. Rejects only once `n >= MAX_CONSECUTIVE_FAILURES` and every
/// one of them failed.
pub fn loop_broken(recent_succeeded: &[bool]) -> bool {
    recent_succeeded.len() >= MAX_CONSECUTIVE_FAILURES as usize
        && recent_succeeded
            .iter()
            .take(MAX_CONSECUTIVE_FAILURES as usize)
            .all(|succeeded| !succeeded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(flags: ToolFlags, action_type: ActionType, sensitivity: Sensitivity, scope: ActionScope) -> PolicyCheck {
        PolicyCheck {
            tool_name: "test_tool".to_string(),
            tool_found: true,
            flags,
            action_type,
            target_entity: "widget-1".to_string(),
            scope,
            sensitivity,
            intent_summary: "do a thing".to_string(),
            args_preview: serde_json::json!({}),
        }
    }

    fn flags(side_effects: bool, external: bool, destructive: bool, category: ToolCategory) -> ToolFlags {
        ToolFlags {
            side_effects,
            external_communication: external,
            destructive,
            category,
        }
    }

    #[test]
    fn unknown_tool_is_denied() {
        let mut c = check(flags(false, false, false, ToolCategory::Other), ActionType::Read, Sensitivity::Low, ActionScope::Single);
        c.tool_found = false;
        let d = evaluate(&c, Utc::now());
        assert_eq!(d.decision, PolicyDecisionKind::Deny);
        assert_eq!(d.risk, 100);
        assert_eq!(d.reason_code, "UNKNOWN_TOOL");
    }

    #[test]
    fn low_risk_read_is_allowed() {
        let c = check(flags(false, false, false, ToolCategory::Calendar), ActionType::Read, Sensitivity::Low, ActionScope::Single);
        let d = evaluate(&c, Utc::now());
        assert_eq!(d.decision, PolicyDecisionKind::Allow);
        assert!(d.risk <= 10);
        assert_eq!(d.reason_code, "LOW_RISK_READ");
    }

    #[test]
    fn external_communication_requires_confirmation() {
        let c = check(flags(true, true, false, ToolCategory::Email), ActionType::Write, Sensitivity::Medium, ActionScope::Single);
        let d = evaluate(&c, Utc::now());
        assert_eq!(d.decision, PolicyDecisionKind::AllowWithConfirmation);
        assert!(d.risk >= 60);
        assert_eq!(d.reason_code, "EXTERNAL_COMM_CONFIRM");
    }

    #[test]
    fn destructive_overrides_external_comm() {
        let c = check(flags(true, true, true, ToolCategory::Files), ActionType::Delete, Sensitivity::High, ActionScope::Single);
        let d = evaluate(&c, Utc::now());
        assert_eq!(d.decision, PolicyDecisionKind::Escalate);
        assert_eq!(d.reason_code, "DESTRUCTIVE_ACTION");
        assert!(d.required_phrase.is_some());
    }

    #[test]
    fn system_execution_overrides_destructive() {
        let c = check(flags(true, false, true, ToolCategory::System), ActionType::Execute, Sensitivity::High, ActionScope::Single);
        let d = evaluate(&c, Utc::now());
        assert_eq!(d.decision, PolicyDecisionKind::Escalate);
        assert_eq!(d.risk, 100);
        assert_eq!(d.reason_code, "SYSTEM_EXECUTION");
        assert_eq!(d.required_phrase.as_deref(), Some("CONFIRM SYSTEM EXECUTE"));
    }

    #[test]
    fn batch_upgrades_plain_allow() {
        let c = check(flags(true, false, false, ToolCategory::Files), ActionType::Write, Sensitivity::Medium, ActionScope::Batch);
        let d = evaluate(&c, Utc::now());
        assert_eq!(d.decision, PolicyDecisionKind::AllowWithConfirmation);
        assert_eq!(d.reason_code, "BATCH_OPERATION_CONFIRM");
    }

    #[test]
    fn non_escalate_decisions_never_carry_a_required_phrase() {
        let c = check(flags(true, true, false, ToolCategory::Email), ActionType::Write, Sensitivity::Medium, ActionScope::Single);
        let d = evaluate(&c, Utc::now());
        assert!(d.required_phrase.is_none());
    }

    #[test]
    fn interactive_decisions_set_an_expiry() {
        let now = Utc::now();
        let c = check(flags(true, true, false, ToolCategory::Email), ActionType::Write, Sensitivity::Medium, ActionScope::Single);
        let d = evaluate(&c, now);
        assert!(d.expires_at.unwrap() > now);
    }

    #[test]
    fn rate_limit_guard_rejects_at_threshold() {
        assert!(!rate_limit_exceeded(9));
        assert!(rate_limit_exceeded(10));
    }

    #[test]
    fn loop_breaker_requires_all_recent_to_fail() {
        assert!(!loop_broken(&[false, false]));
        assert!(!loop_broken(&[true, false, false]));
        assert!(loop_broken(&[false, false, false]));
        assert!(loop_broken(&[false, false, false, true]));
    }
}
