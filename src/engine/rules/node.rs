use crate::domain::error::RuleError;
use crate::domain::rules::{RuleKind, RuleNode};
use crate::engine::expr::ExpressionParser;
use crate::engine::labels::{
    is_valid_label_name, is_valid_label_value, is_valid_metric_name, matches_label_name_grammar,
};

/// Validates one rule and returns the first violated constraint.
///
/// Checks run in a fixed order: record/alert exclusivity, expression presence,
/// expression syntax, recording-rule restrictions, labels, annotations. Labels
/// and annotations are visited in key order.
pub fn validate_rule_node<P: ExpressionParser>(
    node: &RuleNode,
    group_name: &str,
    parser: &P,
) -> Result<(), RuleError> {
    let (kind, name) = match (node.record.is_empty(), node.alert.is_empty()) {
        (false, false) => return Err(RuleError::RecordAndAlert),
        (true, true) => return Err(RuleError::MissingRecordOrAlert),
        (false, true) => (RuleKind::Record, node.record.as_str()),
        (true, false) => (RuleKind::Alert, node.alert.as_str()),
    };

    if node.expr.is_empty() {
        return Err(RuleError::MissingExpr);
    }
    parser
        .parse(&node.expr)
        .map_err(|source| RuleError::Expression {
            kind,
            name: name.to_string(),
            group: group_name.to_string(),
            source,
        })?;

    if kind == RuleKind::Record {
        if !node.annotations.is_empty() {
            return Err(RuleError::AnnotationsInRecordingRule);
        }
        if !node.r#for.is_zero() {
            return Err(RuleError::ForInRecordingRule);
        }
        if !node.keep_firing_for.is_zero() {
            return Err(RuleError::KeepFiringForInRecordingRule);
        }
        if !is_valid_metric_name(name) {
            return Err(RuleError::InvalidRecordName(name.to_string()));
        }
    }

    for (key, value) in &node.labels {
        if !is_valid_label_name(key) {
            return Err(RuleError::InvalidLabelName(key.clone()));
        }
        if !is_valid_label_value(value) {
            return Err(RuleError::InvalidLabelValue(value.clone()));
        }
    }

    for key in node.annotations.keys() {
        if !matches_label_name_grammar(key) {
            return Err(RuleError::InvalidAnnotationName(key.clone()));
        }
    }

    Ok(())
}
