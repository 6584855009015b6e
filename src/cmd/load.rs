use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::domain::error::RuleError;
use crate::domain::report::{ErrorEntry, SourceReport};
use crate::domain::rules::RuleNamespace;
use crate::engine::expr::ExpressionParser;
use crate::engine::rules::{parse_rules_bytes, validate_groups};
use crate::engine::terraform::namespaces_from_terraform;
use crate::io::format::hcl::read_hcl;
use crate::io::{self, Format, IoError, reader};

pub const STDIN_LABEL: &str = "-";

/// Input selection shared by `check` and `dump`.
#[derive(Debug, Clone, Default)]
pub struct RuleInputArgs {
    pub input: Option<PathBuf>,
    pub from: Option<Format>,
}

impl RuleInputArgs {
    /// Input path, with `-` treated as stdin.
    pub fn input_path(&self) -> Option<&Path> {
        self.input
            .as_deref()
            .filter(|path| path.as_os_str() != STDIN_LABEL)
    }

    pub fn resolve_format(&self) -> Result<Format, IoError> {
        io::resolve_input_format(self.from, self.input_path())
    }
}

/// Accepted namespaces and rejected-rule errors of one input source.
#[derive(Debug)]
pub struct SourceOutcome {
    pub source: String,
    pub format: Format,
    pub namespaces: Vec<RuleNamespace>,
    pub errors: Vec<RuleError>,
}

impl SourceOutcome {
    pub fn to_report(&self) -> SourceReport {
        SourceReport {
            source: self.source.clone(),
            format: self.format.as_str().to_string(),
            namespaces: self.namespaces.len(),
            groups: self.namespaces.iter().map(|ns| ns.groups.len()).sum(),
            rules: self.namespaces.iter().map(RuleNamespace::rule_count).sum(),
            errors: self
                .errors
                .iter()
                .map(|err| ErrorEntry {
                    kind: err.class().as_str().to_string(),
                    message: err.to_string(),
                })
                .collect(),
        }
    }
}

/// Reads and validates every source selected by `args`.
///
/// Unreadable inputs abort with an [`IoError`]. Rule errors never abort:
/// each failing source is logged and recorded in its outcome so the
/// remaining files of a directory are still processed. `stdin` is `None`
/// when it is attached to a terminal.
pub fn load_sources<R: Read, P: ExpressionParser>(
    args: &RuleInputArgs,
    stdin: Option<R>,
    parser: &P,
) -> Result<Vec<SourceOutcome>, IoError> {
    let format = args.resolve_format()?;

    let Some(path) = args.input_path() else {
        let stdin = stdin.ok_or(IoError::StdinTerminal)?;
        let content = reader::read_all(stdin)?;
        let outcome = process_content(STDIN_LABEL.to_string(), format, &content, parser);
        if let Some(first) = outcome.errors.first() {
            error!(error = %first, errors = outcome.errors.len(), "could not parse stdin");
        }
        return Ok(vec![outcome]);
    };

    let files = reader::discover_sources(path, format)?;
    let mut outcomes = Vec::with_capacity(files.len());
    for file in files {
        let content = reader::read_file(&file)?;
        let label = file.display().to_string();
        let outcome = process_content(label, format, &content, parser);
        if let Some(first) = outcome.errors.first() {
            warn!(
                file = %outcome.source,
                error = %first,
                errors = outcome.errors.len(),
                "could not parse file"
            );
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

fn process_content<P: ExpressionParser>(
    source: String,
    format: Format,
    content: &[u8],
    parser: &P,
) -> SourceOutcome {
    let (namespaces, errors) = match format {
        Format::Yaml => match parse_rules_bytes(content, parser) {
            Ok(namespaces) => (namespaces, Vec::new()),
            Err(errors) => (Vec::new(), errors),
        },
        Format::Hcl => process_hcl(content, parser),
    };
    SourceOutcome {
        source,
        format,
        namespaces,
        errors,
    }
}

/// HCL sources keep every valid namespace and report the rest.
fn process_hcl<P: ExpressionParser>(
    content: &[u8],
    parser: &P,
) -> (Vec<RuleNamespace>, Vec<RuleError>) {
    let converted = read_hcl(content)
        .map_err(RuleError::from)
        .and_then(|document| namespaces_from_terraform(&document));
    let namespaces = match converted {
        Ok(namespaces) => namespaces,
        Err(err) => return (Vec::new(), vec![err]),
    };

    let mut accepted = Vec::with_capacity(namespaces.len());
    let mut errors = Vec::new();
    for namespace in namespaces {
        let namespace_errors = validate_groups(&namespace.groups, parser);
        if namespace_errors.is_empty() {
            accepted.push(namespace);
        } else {
            errors.extend(namespace_errors);
        }
    }
    (accepted, errors)
}
