use rulelint::domain::error::{RuleError, RuleErrorClass};
use rulelint::engine::expr::QueryParser;
use rulelint::engine::rules::parse_rules_bytes;

#[test]
fn failing_second_document_discards_the_first() {
    let content = br#"
groups:
  - name: alerts
    rules:
      - alert: HighLoad
        expr: up == 0
        for: 5m
---
groups:
  - name: alerts
    rules:
      - alert: HighLoad
"#;

    let errors = parse_rules_bytes(content, &QueryParser).expect_err("second document fails");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].to_string(), "field 'expr' must be set in rule");
}

#[test]
fn same_group_name_in_separate_documents_is_allowed() {
    let content = br#"
namespace: a
groups:
  - name: alerts
    rules:
      - alert: HighLoad
        expr: up == 0
---
namespace: b
groups:
  - name: alerts
    rules:
      - record: job:up:sum
        expr: sum by (job) (up)
"#;

    let namespaces = parse_rules_bytes(content, &QueryParser).expect("two documents");
    assert_eq!(namespaces.len(), 2);
    assert_eq!(namespaces[0].namespace.as_deref(), Some("a"));
    assert_eq!(namespaces[1].groups[0].rules[0].record, "job:up:sum");
}

#[test]
fn unknown_keys_are_decode_errors() {
    let content = br#"
groups:
  - name: alerts
    rules:
      - alert: HighLoad
        expr: up == 0
        severity: page
"#;

    let errors = parse_rules_bytes(content, &QueryParser).expect_err("strict decode");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].class(), RuleErrorClass::Decode);
    assert!(errors[0].to_string().contains("severity"));
}

#[test]
fn log_queries_are_accepted() {
    let content = br#"
namespace: logs
groups:
  - name: api
    interval: 1m
    rules:
      - alert: ApiErrors
        expr: |
          sum by (app) (rate({app="api"} |= "error" | json | status >= 500 [5m])) > 10
        for: 10m
        labels:
          severity: critical
        annotations:
          summary: "{{ $labels.app }} is failing"
      - record: app:bytes:rate5m
        expr: sum by (app) (bytes_rate({app=~"api|web"}[5m]))
"#;

    let namespaces = parse_rules_bytes(content, &QueryParser).expect("log rules");
    assert_eq!(namespaces[0].rule_count(), 2);
}

#[test]
fn documents_without_content_yield_no_namespaces() {
    for content in ["", "\n", "# rules are generated elsewhere\n", "---\n", "---\n---\n"] {
        let namespaces = parse_rules_bytes(content.as_bytes(), &QueryParser)
            .unwrap_or_else(|errors| panic!("{content:?}: {errors:?}"));
        assert!(namespaces.is_empty(), "{content:?}");
    }
}

#[test]
fn trailing_separator_keeps_preceding_namespace() {
    let content = br#"
# node rules
groups:
  - name: node
    rules:
      - alert: InstanceDown
        expr: up == 0
---
"#;

    let namespaces = parse_rules_bytes(content, &QueryParser).expect("trailing separator");
    assert_eq!(namespaces.len(), 1);
    assert_eq!(namespaces[0].groups[0].name, "node");
}

#[test]
fn less_common_query_syntax_is_accepted() {
    let content = br#"
groups:
  - name: metrics
    rules:
      - record: job:latency:fraction
        expr: histogram_fraction(0, 0.25, sum by (job) (rate(latency[5m])))
      - record: job:up:mad
        expr: mad_over_time(up[1h] @ end())
      - record: job:up:smoothed
        expr: double_exponential_smoothing(up[10m], 0.3, 0.7)
      - alert: FewTargets
        expr: limitk(3, sort_by_label(up, "job")) < pi()
  - name: logs
    rules:
      - alert: Panics
        expr: count_over_time({app="api"} |> "<_> panic <_>" or "fatal" [5m]) > 0
      - alert: InternalTraffic
        expr: sum(rate({app="api"} | logfmt --strict | addr = ip("10.0.0.0/8") [1m])) > 1
      - record: app:errors:top
        expr: approx_topk(3, sum by (path) (rate({app="api"} |= "error" [5m])))
"#;

    let namespaces = parse_rules_bytes(content, &QueryParser).expect("uncommon syntax");
    assert_eq!(namespaces[0].rule_count(), 7);
}

#[test]
fn deeply_nested_expression_is_rejected_as_expression_error() {
    let expr = format!("{}up{}", "(".repeat(5_000), ")".repeat(5_000));
    let content =
        format!("groups:\n  - name: g\n    rules:\n      - alert: Deep\n        expr: {expr}\n");

    let errors = parse_rules_bytes(content.as_bytes(), &QueryParser).expect_err("too deep");
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], RuleError::Expression { .. }));
    assert_eq!(errors[0].class(), RuleErrorClass::SchemaViolation);
    assert!(errors[0].to_string().contains("expression nesting too deep"));
}
