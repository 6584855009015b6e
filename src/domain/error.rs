use thiserror::Error;

use crate::domain::rules::RuleKind;
use crate::engine::expr::ExprError;
use crate::io::IoError;

/// Errors produced while decoding or validating rule documents.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Document could not be decoded against the rule schema.
    #[error("yaml decode error: {0}")]
    Decode(#[from] serde_yaml::Error),

    /// Input could not be parsed before schema decoding.
    #[error("{0}")]
    Input(#[from] IoError),

    /// Terraform resource could not be mapped onto a rule group.
    #[error("resource `{address}`: {message}")]
    Resource { address: String, message: String },

    #[error("group {index}: groupname must not be empty")]
    EmptyGroupName { index: usize },

    #[error("groupname: \"{name}\" is repeated in the same file")]
    DuplicateGroupName { name: String },

    #[error("only one of 'record' and 'alert' must be set")]
    RecordAndAlert,

    #[error("one of 'record' or 'alert' must be set")]
    MissingRecordOrAlert,

    #[error("field 'expr' must be set in rule")]
    MissingExpr,

    /// Rule expression was rejected by the expression parser.
    #[error("could not parse expression for {kind} '{name}' in group '{group}': {source}")]
    Expression {
        kind: RuleKind,
        name: String,
        group: String,
        #[source]
        source: ExprError,
    },

    #[error("invalid field 'annotations' in recording rule")]
    AnnotationsInRecordingRule,

    #[error("invalid field 'for' in recording rule")]
    ForInRecordingRule,

    #[error("invalid field 'keep_firing_for' in recording rule")]
    KeepFiringForInRecordingRule,

    #[error("invalid recording rule name: {0}")]
    InvalidRecordName(String),

    #[error("invalid label name: {0}")]
    InvalidLabelName(String),

    #[error("invalid label value: {0}")]
    InvalidLabelValue(String),

    #[error("invalid annotation name: {0}")]
    InvalidAnnotationName(String),
}

/// Coarse classification of a [`RuleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleErrorClass {
    Decode,
    SchemaViolation,
}

impl RuleErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "decode_error",
            Self::SchemaViolation => "schema_violation",
        }
    }
}

impl RuleError {
    pub fn class(&self) -> RuleErrorClass {
        match self {
            Self::Decode(_) | Self::Input(_) | Self::Resource { .. } => RuleErrorClass::Decode,
            _ => RuleErrorClass::SchemaViolation,
        }
    }
}

/// Errors produced by the `check` and `dump` command boundary.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    InputUsage(#[from] IoError),

    #[error("failed to serialize {what}: {message}")]
    Internal { what: &'static str, message: String },
}

impl CommandError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InputUsage(_) => 3,
            Self::Internal { .. } => 1,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InputUsage(_) => "input_usage_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}
