use rulelint::domain::rules::{RuleGroup, RuleNode};
use rulelint::engine::expr::QueryParser;
use rulelint::engine::rules::validate_groups;

fn group(name: &str, rule_count: usize) -> RuleGroup {
    RuleGroup {
        name: name.to_string(),
        rules: (0..rule_count)
            .map(|index| RuleNode {
                alert: format!("A{index}"),
                expr: "up == 0".to_string(),
                ..RuleNode::default()
            })
            .collect(),
        ..RuleGroup::default()
    }
}

#[test]
fn duplicate_group_names_are_reported_once_per_repeat() {
    for rule_count in [0, 1, 5] {
        let groups = [group("g1", rule_count), group("g1", rule_count)];
        let errors = validate_groups(&groups, &QueryParser);
        assert_eq!(errors.len(), 1, "rule_count={rule_count}");
        assert!(errors[0].to_string().contains("\"g1\""));
    }

    let errors = validate_groups(&[group("g1", 1), group("g1", 1), group("g1", 1)], &QueryParser);
    assert_eq!(errors.len(), 2);
}

#[test]
fn every_failing_rule_contributes_one_error() {
    let mut broken = group("g", 0);
    broken.rules = vec![
        RuleNode::default(),
        RuleNode {
            record: "r".to_string(),
            alert: "a".to_string(),
            ..RuleNode::default()
        },
        RuleNode {
            alert: "ok".to_string(),
            expr: "up".to_string(),
            ..RuleNode::default()
        },
        RuleNode {
            alert: "noexpr".to_string(),
            ..RuleNode::default()
        },
    ];

    let messages: Vec<String> = validate_groups(&[broken], &QueryParser)
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        messages,
        vec![
            "one of 'record' or 'alert' must be set",
            "only one of 'record' and 'alert' must be set",
            "field 'expr' must be set in rule",
        ]
    );
}

#[test]
fn validation_is_repeatable() {
    let groups = vec![group("", 1), group("x", 2), group("x", 0)];
    let first: Vec<String> = validate_groups(&groups, &QueryParser)
        .iter()
        .map(ToString::to_string)
        .collect();
    let second: Vec<String> = validate_groups(&groups, &QueryParser)
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(first, second);
    assert_eq!(
        first,
        vec![
            "group 0: groupname must not be empty",
            "groupname: \"x\" is repeated in the same file",
        ]
    );
}
