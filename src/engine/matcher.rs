use crate::config::{Rule, RuleSet};
use crate::feed::Event;

/// One (event, rule) pair whose pattern matched the event text.
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    pub event: &'a Event,
    pub rule: &'a Rule,
    /// Position of the rule in the rule set, for logs.
    pub index: usize,
}

/// Evaluate every rule against the event text. No early exit: a message
/// hitting k rules yields k matches, in rule order.
pub fn match_rules<'a>(event: &'a Event, rules: &'a RuleSet) -> Vec<Match<'a>> {
    rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| rule.pattern.is_match(&event.text))
        .map(|(index, rule)| Match { event, rule, index })
        .collect()
}
