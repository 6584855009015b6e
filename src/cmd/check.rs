use std::io::Read;

use serde::Serialize;
use serde_json::{Value, json};

use crate::cmd::load::{RuleInputArgs, load_sources};
use crate::domain::error::CommandError;
use crate::domain::report::CheckReport;
use crate::engine::expr::QueryParser;

/// Structured command response that carries exit-code mapping and JSON payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckCommandResponse {
    pub exit_code: i32,
    pub payload: Value,
}

/// Validates every selected rule source.
///
/// Exit codes: `0` all sources valid, `2` at least one source rejected,
/// `3` unusable input, `1` internal failure.
pub fn run_with_stdin<R: Read>(args: &RuleInputArgs, stdin: Option<R>) -> CheckCommandResponse {
    match execute(args, stdin) {
        Ok(report) => report_response(&report),
        Err(error) => CheckCommandResponse {
            exit_code: error.exit_code(),
            payload: json!({
                "error": error.kind(),
                "message": error.to_string(),
            }),
        },
    }
}

pub fn execute<R: Read>(
    args: &RuleInputArgs,
    stdin: Option<R>,
) -> Result<CheckReport, CommandError> {
    let outcomes = load_sources(args, stdin, &QueryParser)?;
    Ok(CheckReport::from_sources(
        outcomes.iter().map(|outcome| outcome.to_report()).collect(),
    ))
}

fn report_response(report: &CheckReport) -> CheckCommandResponse {
    let exit_code = if report.valid { 0 } else { 2 };
    match serde_json::to_value(report) {
        Ok(payload) => CheckCommandResponse { exit_code, payload },
        Err(error) => CheckCommandResponse {
            exit_code: 1,
            payload: json!({
                "error": "internal_error",
                "message": format!("failed to serialize check report: {error}"),
            }),
        },
    }
}

/// Pipeline steps for diagnostics output.
pub fn pipeline_steps() -> Vec<String> {
    vec![
        "resolve_rule_sources".to_string(),
        "decode_rule_documents".to_string(),
        "validate_rule_groups".to_string(),
        "emit_check_report".to_string(),
    ]
}

/// Determinism guards planned for the `check` command.
pub fn deterministic_guards() -> Vec<String> {
    vec![
        "directory_entries_sorted_by_path".to_string(),
        "first_error_per_rule".to_string(),
        "group_errors_in_document_order".to_string(),
    ]
}
