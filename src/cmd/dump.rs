use std::io::{Read, Write};

use crate::cmd::load::{RuleInputArgs, load_sources};
use crate::domain::error::CommandError;
use crate::domain::report::CheckReport;
use crate::domain::rules::RuleNamespace;
use crate::engine::expr::QueryParser;
use crate::io::format::yaml::write_namespaces;

/// Writes every accepted namespace to `output` as multi-document YAML.
///
/// Rejected sources are left out of the stream; the returned report tells
/// the caller whether anything was dropped.
pub fn run<R: Read, W: Write>(
    args: &RuleInputArgs,
    stdin: Option<R>,
    output: W,
) -> Result<CheckReport, CommandError> {
    let outcomes = load_sources(args, stdin, &QueryParser)?;
    let accepted: Vec<&RuleNamespace> = outcomes
        .iter()
        .flat_map(|outcome| outcome.namespaces.iter())
        .collect();

    write_namespaces(output, accepted).map_err(|error| CommandError::Internal {
        what: "rule namespaces",
        message: error.to_string(),
    })?;

    Ok(CheckReport::from_sources(
        outcomes.iter().map(|outcome| outcome.to_report()).collect(),
    ))
}

pub fn pipeline_steps() -> Vec<String> {
    vec![
        "resolve_rule_sources".to_string(),
        "decode_rule_documents".to_string(),
        "validate_rule_groups".to_string(),
        "write_accepted_namespaces_yaml".to_string(),
    ]
}

pub fn deterministic_guards() -> Vec<String> {
    vec![
        "directory_entries_sorted_by_path".to_string(),
        "label_maps_sorted_by_key".to_string(),
        "durations_in_canonical_form".to_string(),
    ]
}
