//! First-match rule selection

use super::rule::RoutingRule;
use crate::context::TaskContext;

/// Ordered rule list; the first rule whose condition holds wins
#[derive(Debug, Clone, Default)]
pub struct RuleMatcher {
    rules: Vec<RoutingRule>,
}

impl RuleMatcher {
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        Self { rules }
    }

    /// First rule, in declaration order, whose condition matches the task
    pub fn find_match(&self, task: &TaskContext) -> Option<&RoutingRule> {
        self.rules.iter().find(|rule| rule.condition.matches(task))
    }

    /// All rules in declaration order
    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    /// Rules that could serve `task_type` (its `task_type` list names it or is unset)
    pub fn rules_for_task_type(&self, task_type: &str) -> Vec<&RoutingRule> {
        self.rules
            .iter()
            .filter(|rule| rule.condition.accepts_task_type(task_type))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{RuleCondition, SingleCall};

    fn matcher() -> RuleMatcher {
        RuleMatcher::new(vec![
            RoutingRule::single("research", SingleCall::new("p1", "ask"))
                .with_condition(RuleCondition::default().task_types(["research"])),
            RoutingRule::single("research_again", SingleCall::new("p2", "ask"))
                .with_condition(RuleCondition::default().task_types(["research"])),
            RoutingRule::single("contextual", SingleCall::new("p3", "context"))
                .with_condition(RuleCondition::default().context_required(true)),
            RoutingRule::single("catch_all", SingleCall::new("p4", "generic")),
        ])
    }

    #[test]
    fn test_first_match_wins() {
        let matcher = matcher();
        let rule = matcher.find_match(&TaskContext::new("research", "x")).unwrap();
        assert_eq!(rule.name, "research");

        let mut reordered = matcher.rules().to_vec();
        reordered.swap(0, 1);
        let matcher = RuleMatcher::new(reordered);
        let rule = matcher.find_match(&TaskContext::new("research", "x")).unwrap();
        assert_eq!(rule.name, "research_again");
    }

    #[test]
    fn test_falls_through_to_catch_all() {
        let matcher = matcher();
        let rule = matcher.find_match(&TaskContext::new("review", "x")).unwrap();
        assert_eq!(rule.name, "catch_all");

        let rule = matcher
            .find_match(&TaskContext::new("review", "x").with_context_required(true))
            .unwrap();
        assert_eq!(rule.name, "contextual");
    }

    #[test]
    fn test_no_match() {
        let matcher = RuleMatcher::new(vec![
            RoutingRule::single("only_research", SingleCall::new("p1", "ask"))
                .with_condition(RuleCondition::default().task_types(["research"])),
        ]);
        assert!(matcher.find_match(&TaskContext::new("deploy", "x")).is_none());
    }

    #[test]
    fn test_rules_for_task_type() {
        let matcher = matcher();
        let names: Vec<_> = matcher
            .rules_for_task_type("research")
            .into_iter()
            .map(|rule| rule.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["research", "research_again", "contextual", "catch_all"]
        );

        let names: Vec<_> = matcher
            .rules_for_task_type("review")
            .into_iter()
            .map(|rule| rule.name.as_str())
            .collect();
        assert_eq!(names, vec!["contextual", "catch_all"]);
    }
}
