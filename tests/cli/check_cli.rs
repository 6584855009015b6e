use std::fs;

use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

const VALID: &str = r#"
groups:
  - name: node
    rules:
      - alert: InstanceDown
        expr: up == 0
        for: 5m
        labels:
          severity: page
"#;

fn parse_stdout(stdout: &[u8]) -> Value {
    serde_json::from_slice(stdout).expect("stdout json")
}

#[test]
fn valid_stdin_exits_zero_with_report() {
    let output = assert_cmd::cargo::cargo_bin_cmd!("rulelint")
        .arg("check")
        .write_stdin(VALID)
        .output()
        .expect("run rulelint");

    assert_eq!(output.status.code(), Some(0));
    let report = parse_stdout(&output.stdout);
    assert_eq!(report["valid"], true);
    assert_eq!(report["rule_count"], 1);
    assert!(output.stderr.is_empty());
}

#[test]
fn invalid_stdin_exits_two() {
    assert_cmd::cargo::cargo_bin_cmd!("rulelint")
        .args(["check", "--input", "-"])
        .write_stdin("groups:\n  - name: g\n    rules:\n      - record: 1invalid\n        expr: up\n")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("invalid recording rule name: 1invalid"));
}

#[test]
fn failing_file_is_logged_and_remaining_files_are_checked() {
    let dir = tempdir().expect("tempdir");
    fs::write(
        dir.path().join("a.yaml"),
        "groups:\n  - name: g\n    rules:\n      - alert: A\n        expr: sum(\n",
    )
    .expect("write");
    fs::write(dir.path().join("b.yaml"), VALID).expect("write");

    let output = assert_cmd::cargo::cargo_bin_cmd!("rulelint")
        .arg("check")
        .arg("--input")
        .arg(dir.path())
        .output()
        .expect("run rulelint");

    assert_eq!(output.status.code(), Some(2));
    let report = parse_stdout(&output.stdout);
    assert_eq!(report["sources"].as_array().expect("sources").len(), 2);
    assert_eq!(report["rule_count"], 1);
    let stderr = String::from_utf8(output.stderr).expect("utf8");
    assert!(stderr.contains("could not parse file"), "{stderr}");
    assert!(stderr.contains("a.yaml"), "{stderr}");
}

#[test]
fn log_level_is_read_from_environment() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("rules.yaml"), VALID).expect("write");

    assert_cmd::cargo::cargo_bin_cmd!("rulelint")
        .env("RULELINT_LOG", "debug")
        .arg("check")
        .arg("--input")
        .arg(dir.path())
        .assert()
        .code(0)
        .stderr(predicate::str::contains("reading file"));
}

#[test]
fn missing_input_exits_three() {
    let dir = tempdir().expect("tempdir");
    let output = assert_cmd::cargo::cargo_bin_cmd!("rulelint")
        .arg("check")
        .arg("--input")
        .arg(dir.path().join("absent.yaml"))
        .output()
        .expect("run rulelint");

    assert_eq!(output.status.code(), Some(3));
    assert!(output.stdout.is_empty());
    let error: Value = serde_json::from_slice(&output.stderr).expect("stderr json");
    assert_eq!(error["error"], "input_usage_error");
    assert_eq!(error["details"]["command"], "check");
}

#[test]
fn emit_pipeline_writes_report_to_stderr() {
    let output = assert_cmd::cargo::cargo_bin_cmd!("rulelint")
        .args(["check", "--emit-pipeline"])
        .write_stdin(VALID)
        .output()
        .expect("run rulelint");

    assert_eq!(output.status.code(), Some(0));
    let pipeline: Value = serde_json::from_slice(&output.stderr).expect("pipeline json");
    assert_eq!(pipeline["command"], "check");
    assert_eq!(pipeline["input"]["sources"][0]["source"], "stdin");
    assert_eq!(pipeline["input"]["sources"][0]["format"], "yaml");
    assert_eq!(pipeline["steps"][0], "resolve_rule_sources");
}

#[test]
fn empty_stdin_is_valid_with_no_namespaces() {
    let output = assert_cmd::cargo::cargo_bin_cmd!("rulelint")
        .arg("check")
        .write_stdin("")
        .output()
        .expect("run rulelint");

    assert_eq!(output.status.code(), Some(0));
    let report = parse_stdout(&output.stdout);
    assert_eq!(report["valid"], true);
    assert_eq!(report["namespace_count"], 0);
    assert_eq!(report["error_count"], 0);
}

#[test]
fn placeholder_files_in_directory_stay_valid() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("a.yaml"), "# populated by the release job\n").expect("write");
    fs::write(dir.path().join("b.yaml"), VALID).expect("write");

    let output = assert_cmd::cargo::cargo_bin_cmd!("rulelint")
        .arg("check")
        .arg("--input")
        .arg(dir.path())
        .output()
        .expect("run rulelint");

    assert_eq!(output.status.code(), Some(0));
    let report = parse_stdout(&output.stdout);
    assert_eq!(report["namespace_count"], 1);
    assert_eq!(report["sources"].as_array().map(Vec::len), Some(2));
}
