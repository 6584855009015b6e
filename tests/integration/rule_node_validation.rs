use std::collections::BTreeMap;
use std::time::Duration;

use rulelint::domain::error::RuleError;
use rulelint::domain::rules::{RuleDuration, RuleNode};
use rulelint::engine::expr::{ExprError, ExpressionParser, QueryParser};
use rulelint::engine::labels::{is_valid_label_name, is_valid_metric_name};
use rulelint::engine::rules::validate_rule_node;

/// Accepts everything; isolates the structural checks from expression syntax.
struct AcceptAll;

impl ExpressionParser for AcceptAll {
    type Ast = ();

    fn parse(&self, _input: &str) -> Result<(), ExprError> {
        Ok(())
    }
}

fn alert(name: &str, expr: &str) -> RuleNode {
    RuleNode {
        alert: name.to_string(),
        expr: expr.to_string(),
        ..RuleNode::default()
    }
}

fn record(name: &str, expr: &str) -> RuleNode {
    RuleNode {
        record: name.to_string(),
        expr: expr.to_string(),
        ..RuleNode::default()
    }
}

fn labels(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[test]
fn metric_name_grammar() {
    for name in ["up", "job:up:sum", "_x", ":a", "A_9"] {
        assert!(is_valid_metric_name(name), "{name}");
    }
    for name in ["", "1up", "a-b", "a.b", "a b", "é"] {
        assert!(!is_valid_metric_name(name), "{name}");
    }
    assert!(!is_valid_label_name("a:b"));
    assert!(!is_valid_label_name("__name__"));
}

#[test]
fn record_and_alert_together_mention_both_fields() {
    let node = RuleNode {
        record: "r".to_string(),
        ..alert("A", "up")
    };
    let message = validate_rule_node(&node, "g", &AcceptAll)
        .expect_err("both set")
        .to_string();
    assert!(message.contains("record"));
    assert!(message.contains("alert"));
}

#[test]
fn neither_record_nor_alert_is_rejected() {
    let node = RuleNode {
        expr: "up".to_string(),
        ..RuleNode::default()
    };
    assert!(matches!(
        validate_rule_node(&node, "g", &AcceptAll),
        Err(RuleError::MissingRecordOrAlert)
    ));
}

#[test]
fn invalid_recording_rule_name_is_cited() {
    let err = validate_rule_node(&record("1invalid", "up"), "g", &QueryParser)
        .expect_err("bad name");
    assert_eq!(err.to_string(), "invalid recording rule name: 1invalid");
}

#[test]
fn protected_metric_name_label_is_rejected() {
    let node = RuleNode {
        labels: labels(&[("__name__", "x")]),
        ..alert("A", "up == 0")
    };
    let err = validate_rule_node(&node, "g", &QueryParser).expect_err("protected label");
    assert_eq!(err.to_string(), "invalid label name: __name__");
}

#[test]
fn recording_rule_restrictions_follow_check_order() {
    let node = RuleNode {
        annotations: labels(&[("summary", "s")]),
        r#for: RuleDuration(Duration::from_secs(60)),
        ..record("1bad", "up")
    };
    assert!(matches!(
        validate_rule_node(&node, "g", &AcceptAll),
        Err(RuleError::AnnotationsInRecordingRule)
    ));

    let node = RuleNode {
        annotations: BTreeMap::new(),
        ..node
    };
    assert!(matches!(
        validate_rule_node(&node, "g", &AcceptAll),
        Err(RuleError::ForInRecordingRule)
    ));

    let node = RuleNode {
        r#for: RuleDuration::ZERO,
        keep_firing_for: RuleDuration(Duration::from_secs(30)),
        ..node
    };
    assert!(matches!(
        validate_rule_node(&node, "g", &AcceptAll),
        Err(RuleError::KeepFiringForInRecordingRule)
    ));
}

#[test]
fn expression_errors_name_the_rule_and_group() {
    let err = validate_rule_node(&alert("HighLoad", "sum(up"), "node", &QueryParser)
        .expect_err("unbalanced");
    let message = err.to_string();
    assert!(
        message.starts_with("could not parse expression for alert 'HighLoad' in group 'node':"),
        "{message}"
    );
}

#[test]
fn annotations_only_need_label_name_grammar() {
    let node = RuleNode {
        annotations: labels(&[("__name__", "fine"), ("runbook_url", "https://x")]),
        ..alert("A", "up == 0")
    };
    assert!(validate_rule_node(&node, "g", &QueryParser).is_ok());

    let node = RuleNode {
        annotations: labels(&[("bad-key", "v")]),
        ..alert("A", "up == 0")
    };
    assert_eq!(
        validate_rule_node(&node, "g", &QueryParser)
            .expect_err("bad annotation")
            .to_string(),
        "invalid annotation name: bad-key"
    );
}

#[test]
fn first_invalid_label_is_chosen_in_key_order() {
    let node = RuleNode {
        labels: labels(&[("z-last", "v"), ("a-first", "v")]),
        ..alert("A", "up == 0")
    };
    assert_eq!(
        validate_rule_node(&node, "g", &QueryParser)
            .expect_err("bad labels")
            .to_string(),
        "invalid label name: a-first"
    );
}
