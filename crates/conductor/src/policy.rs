//! Evaluates `(action_type, trust_level)` against priority-ordered rules.

use crate::model::{PolicyAction, PolicyEvaluation, PolicyRule};

pub struct PolicyEngine {
    rules: Vec<PolicyRule>,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

impl PolicyEngine {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    /// Seed rules: financial-data requires approval at any trust level,
    /// trust-upgrade requires approval, autonomous research is allowed from
    /// trust 1, autonomous task execution from trust 2, sub-conductor
    /// spawning from trust 3.
    pub fn with_default_rules() -> Self {
        Self::new(vec![
            PolicyRule {
                name: "financial-data".to_string(),
                description: "Any action touching financial data requires approval".to_string(),
                action_types: vec!["financial_data".to_string()],
                min_trust_level: 0,
                max_trust_level: 3,
                action: PolicyAction::RequireApproval,
                priority: 100,
            },
            PolicyRule {
                name: "trust-upgrade".to_string(),
                description: "Trust level changes require approval".to_string(),
                action_types: vec!["trust_upgrade".to_string()],
                min_trust_level: 0,
                max_trust_level: 3,
                action: PolicyAction::RequireApproval,
                priority: 90,
            },
            PolicyRule {
                name: "autonomous-research".to_string(),
                description: "Research tasks run autonomously from trust level 1".to_string(),
                action_types: vec!["research".to_string()],
                min_trust_level: 1,
                max_trust_level: 3,
                action: PolicyAction::Allow,
                priority: 50,
            },
            PolicyRule {
                name: "autonomous-task-execution".to_string(),
                description: "General task execution runs autonomously from trust level 2"
                    .to_string(),
                action_types: vec!["task_execution".to_string()],
                min_trust_level: 2,
                max_trust_level: 3,
                action: PolicyAction::Allow,
                priority: 40,
            },
            PolicyRule {
                name: "sub-conductor-spawning".to_string(),
                description: "Spawning sub-conductors requires trust level 3".to_string(),
                action_types: vec!["spawn".to_string()],
                min_trust_level: 3,
                max_trust_level: 3,
                action: PolicyAction::Allow,
                priority: 30,
            },
        ])
    }

    pub fn add_rule(&mut self, rule: PolicyRule) {
        self.rules.push(rule);
    }

    pub fn remove_rule(&mut self, name: &str) {
        self.rules.retain(|r| r.name != name);
    }

    /// First rule (sorted by priority desc) whose action_types contains
    /// `action_type` and whose `[min,max]` trust bracket contains
    /// `trust_level` wins. Default when no rule matches is
    /// `REQUIRE_APPROVAL`.
    pub fn evaluate(&self, action_type: &str, trust_level: u8) -> PolicyEvaluation {
        let mut candidates: Vec<&PolicyRule> = self
            .rules
            .iter()
            .filter(|r| r.action_types.iter().any(|a| a == action_type))
            .filter(|r| trust_level >= r.min_trust_level && trust_level <= r.max_trust_level)
            .collect();
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority));

        match candidates.first() {
            Some(rule) => PolicyEvaluation {
                action: rule.action,
                matching_rule: Some(rule.name.clone()),
                reason: format!("matched rule '{}'", rule.name),
            },
            None => PolicyEvaluation {
                action: PolicyAction::RequireApproval,
                matching_rule: None,
                reason: "no matching policy rule; defaulting to require approval".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn research_allowed_from_trust_one() {
        let engine = PolicyEngine::with_default_rules();
        let eval = engine.evaluate("research", 1);
        assert_eq!(eval.action, PolicyAction::Allow);
    }

    #[test]
    fn research_requires_approval_below_trust_one() {
        let engine = PolicyEngine::with_default_rules();
        let eval = engine.evaluate("research", 0);
        assert_eq!(eval.action, PolicyAction::RequireApproval);
    }

    #[test]
    fn unmatched_action_defaults_to_require_approval() {
        let engine = PolicyEngine::with_default_rules();
        let eval = engine.evaluate("unknown_action", 3);
        assert_eq!(eval.action, PolicyAction::RequireApproval);
        assert!(eval.matching_rule.is_none());
    }

    #[test]
    fn financial_data_always_requires_approval() {
        let engine = PolicyEngine::with_default_rules();
        let eval = engine.evaluate("financial_data", 3);
        assert_eq!(eval.action, PolicyAction::RequireApproval);
    }
}
