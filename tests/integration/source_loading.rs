use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

use rulelint::cmd::check;
use rulelint::cmd::load::{RuleInputArgs, load_sources};
use rulelint::engine::expr::QueryParser;
use rulelint::io::{Format, IoError};
use tempfile::tempdir;

const VALID: &str = r#"
groups:
  - name: node
    rules:
      - alert: InstanceDown
        expr: up == 0
        for: 5m
"#;

#[test]
fn directory_scan_is_flat_and_sorted() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("b.yaml"), VALID).expect("write");
    fs::write(dir.path().join("a.yml"), VALID).expect("write");
    fs::write(dir.path().join("ignored.tf"), "not hcl {").expect("write");
    fs::create_dir(dir.path().join("nested")).expect("mkdir");
    fs::write(dir.path().join("nested").join("c.yaml"), "garbage: [").expect("write");

    let args = RuleInputArgs {
        input: Some(dir.path().to_path_buf()),
        from: None,
    };
    let outcomes = load_sources(&args, None::<Cursor<&[u8]>>, &QueryParser).expect("load");
    let sources: Vec<_> = outcomes
        .iter()
        .map(|outcome| PathBuf::from(&outcome.source))
        .collect();
    assert_eq!(
        sources,
        vec![dir.path().join("a.yml"), dir.path().join("b.yaml")]
    );
    assert!(outcomes.iter().all(|outcome| outcome.errors.is_empty()));
}

#[test]
fn explicit_format_overrides_extension() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("rules.txt");
    fs::write(&path, VALID).expect("write");

    let unresolved = RuleInputArgs {
        input: Some(path.clone()),
        from: None,
    };
    let err = load_sources(&unresolved, None::<Cursor<&[u8]>>, &QueryParser)
        .expect_err("unknown extension");
    assert!(matches!(err, IoError::UnsupportedPathExtension { .. }));

    let explicit = RuleInputArgs {
        input: Some(path),
        from: Some(Format::Yaml),
    };
    let outcomes =
        load_sources(&explicit, None::<Cursor<&[u8]>>, &QueryParser).expect("explicit yaml");
    assert_eq!(outcomes[0].namespaces.len(), 1);
}

#[test]
fn check_report_aggregates_sources() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("a.yaml"), VALID).expect("write");
    fs::write(
        dir.path().join("b.yaml"),
        "groups:\n  - name: \"\"\n  - name: x\n  - name: x\n",
    )
    .expect("write");

    let args = RuleInputArgs {
        input: Some(dir.path().to_path_buf()),
        from: None,
    };
    let report = check::execute(&args, None::<Cursor<&[u8]>>).expect("check");

    assert!(!report.valid);
    assert_eq!(report.namespace_count, 1);
    assert_eq!(report.group_count, 1);
    assert_eq!(report.rule_count, 1);
    assert_eq!(report.error_count, 2);
    assert_eq!(report.sources.len(), 2);
    assert!(report.sources[0].errors.is_empty());
    assert_eq!(report.sources[1].namespaces, 0);
}

#[test]
fn stdin_decode_failure_is_reported_not_raised() {
    let args = RuleInputArgs::default();
    let report = check::execute(&args, Some(Cursor::new(b"groups: {".as_slice()))).expect("check");

    assert!(!report.valid);
    assert_eq!(report.sources[0].source, "-");
    assert_eq!(report.sources[0].errors[0].kind, "decode_error");
}
