use std::collections::HashSet;

use tracing::debug;

use crate::domain::error::RuleError;
use crate::domain::rules::RuleGroup;
use crate::engine::expr::ExpressionParser;
use crate::engine::rules::node::validate_rule_node;

/// Validates the groups of one namespace and collects every error found.
///
/// Group names must be non-empty and unique within the call. Each rule
/// contributes at most one error.
pub fn validate_groups<P: ExpressionParser>(groups: &[RuleGroup], parser: &P) -> Vec<RuleError> {
    let mut errors = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for (index, group) in groups.iter().enumerate() {
        if group.name.is_empty() {
            errors.push(RuleError::EmptyGroupName { index });
        }
        if !seen.insert(group.name.as_str()) {
            errors.push(RuleError::DuplicateGroupName {
                name: group.name.clone(),
            });
        }

        for rule in &group.rules {
            if let Err(err) = validate_rule_node(rule, &group.name, parser) {
                if let Some((kind, name)) = rule.identity() {
                    debug!(group = %group.name, %kind, rule = name, "rule rejected");
                }
                errors.push(err);
            }
        }
    }

    errors
}
