use predicates::prelude::*;
use serde_json::Value;

#[test]
fn help_lists_commands() {
    assert_cmd::cargo::cargo_bin_cmd!("rulelint")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("dump"));
}

#[test]
fn version_is_available() {
    assert_cmd::cargo::cargo_bin_cmd!("rulelint")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let output = assert_cmd::cargo::cargo_bin_cmd!("rulelint")
        .args(["check", "--from", "json"])
        .output()
        .expect("run rulelint");

    assert_eq!(output.status.code(), Some(3));
    let error: Value = serde_json::from_slice(&output.stderr).expect("stderr json");
    assert_eq!(error["error"], "input_usage_error");
    assert_eq!(error["code"], 3);
    assert_eq!(error["details"]["kind"], "cli_parse_error");
}
