use std::fs;
use std::io::Cursor;

use rulelint::cmd::{dump, load::RuleInputArgs};
use rulelint::engine::expr::QueryParser;
use rulelint::engine::rules::parse_rules_bytes;
use rulelint::engine::terraform::namespaces_from_terraform;
use rulelint::io::format::hcl::read_hcl;
use tempfile::tempdir;

const MODULE: &str = r#"
terraform {
  required_providers {
    loki = {
      source = "grafana/loki"
    }
  }
}

resource "loki_rule_group_alerting" "api" {
  name      = "api-alerts"
  namespace = "api"

  rule {
    alert = "HighErrorRate"
    expr  = "sum(rate({app=\"api\"} |= \"error\" [5m])) > 10"
    for   = "5m"
    labels = {
      severity = "page"
    }
    annotations = {
      summary = "API error rate is high"
    }
  }

  rule {
    alert = "NoLogs"
    expr  = "absent_over_time({app=\"api\"}[15m])"
  }
}

resource "loki_rule_group_recording" "api" {
  name      = "api-records"
  namespace = "api"
  interval  = "1m"

  rule {
    record = "app:errors:rate5m"
    expr   = "sum by (app) (rate({app=\"api\"} |= \"error\" [5m]))"
  }
}

resource "loki_rule_group_recording" "shared" {
  name = "shared-records"

  rule {
    record = "job:lines:rate1m"
    expr   = "sum by (job) (rate({job=~\".+\"}[1m]))"
  }
}
"#;

#[test]
fn resources_are_grouped_by_namespace() {
    let document = read_hcl(MODULE.as_bytes()).expect("parse hcl");
    let namespaces = namespaces_from_terraform(&document).expect("convert");

    assert_eq!(namespaces.len(), 2);
    assert_eq!(namespaces[0].namespace.as_deref(), Some("api"));
    assert_eq!(namespaces[0].groups.len(), 2);
    assert_eq!(namespaces[0].groups[0].rules.len(), 2);
    assert_eq!(namespaces[1].namespace.as_deref(), Some("default"));
    assert_eq!(namespaces[1].groups[0].name, "shared-records");
}

#[test]
fn dumped_yaml_passes_validation() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("main.tf");
    fs::write(&path, MODULE).expect("write");
    let args = RuleInputArgs {
        input: Some(path),
        from: None,
    };

    let mut output = Vec::new();
    let report = dump::run(&args, None::<Cursor<&[u8]>>, &mut output).expect("dump");
    assert!(report.valid);
    assert_eq!(report.rule_count, 4);

    let namespaces = parse_rules_bytes(&output, &QueryParser).expect("dumped yaml is valid");
    assert_eq!(namespaces.len(), 2);
    assert_eq!(
        namespaces[0].groups[0].rules[0].annotations["summary"],
        "API error rate is high"
    );
}
