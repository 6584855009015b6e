use serde::{Deserialize, Serialize};

/// Deterministic report for `check` command output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckReport {
    pub valid: bool,
    pub namespace_count: usize,
    pub group_count: usize,
    pub rule_count: usize,
    pub error_count: usize,
    pub sources: Vec<SourceReport>,
}

impl CheckReport {
    pub fn from_sources(sources: Vec<SourceReport>) -> Self {
        let error_count = sources.iter().map(|source| source.errors.len()).sum();
        Self {
            valid: error_count == 0,
            namespace_count: sources.iter().map(|source| source.namespaces).sum(),
            group_count: sources.iter().map(|source| source.groups).sum(),
            rule_count: sources.iter().map(|source| source.rules).sum(),
            error_count,
            sources,
        }
    }
}

/// Outcome for one input file or stdin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    pub format: String,
    pub namespaces: usize,
    pub groups: usize,
    pub rules: usize,
    pub errors: Vec<ErrorEntry>,
}

/// Single rejected-rule message with its coarse class.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEntry {
    pub kind: String,
    pub message: String,
}

/// Diagnostics report emitted when `--emit-pipeline` is enabled.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PipelineReport {
    pub command: String,
    pub input: PipelineInput,
    pub steps: Vec<String>,
    pub deterministic_guards: Vec<String>,
}

impl PipelineReport {
    pub fn new(
        command: impl Into<String>,
        input: PipelineInput,
        steps: Vec<String>,
        deterministic_guards: Vec<String>,
    ) -> Self {
        Self {
            command: command.into(),
            input,
            steps,
            deterministic_guards,
        }
    }
}

/// Input-source descriptors used in pipeline diagnostics.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PipelineInput {
    pub sources: Vec<PipelineInputSource>,
}

impl PipelineInput {
    pub fn new(sources: Vec<PipelineInputSource>) -> Self {
        Self { sources }
    }
}

/// Single input source descriptor.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PipelineInputSource {
    pub label: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl PipelineInputSource {
    pub fn stdin(label: impl Into<String>, format: Option<&str>) -> Self {
        Self {
            label: label.into(),
            source: "stdin".to_string(),
            path: None,
            format: format.map(ToOwned::to_owned),
        }
    }

    pub fn path(label: impl Into<String>, path: impl Into<String>, format: Option<&str>) -> Self {
        Self {
            label: label.into(),
            source: "path".to_string(),
            path: Some(path.into()),
            format: format.map(ToOwned::to_owned),
        }
    }
}
