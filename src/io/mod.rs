pub mod error;
pub mod format;
pub mod reader;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use error::IoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Hcl,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Hcl => "hcl",
        }
    }

    /// File extensions picked up when scanning a directory.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Yaml => &["yml", "yaml"],
            Self::Hcl => &["tf"],
        }
    }

    pub fn matches_path(self, path: &Path) -> bool {
        format_from_path(path) == Some(self)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = IoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "hcl" | "tf" | "terraform" => Ok(Self::Hcl),
            other => Err(IoError::UnsupportedFormat {
                format: other.to_string(),
            }),
        }
    }
}

/// Resolves the rule format from an explicit flag or the input path.
///
/// Stdin and directories default to YAML.
pub fn resolve_input_format(
    explicit: Option<Format>,
    input: Option<&Path>,
) -> Result<Format, IoError> {
    if let Some(format) = explicit {
        return Ok(format);
    }
    let Some(path) = input else {
        return Ok(Format::Yaml);
    };
    if path.is_dir() {
        return Ok(Format::Yaml);
    }
    format_from_path(path).ok_or_else(|| IoError::UnsupportedPathExtension {
        path: path.to_string_lossy().into_owned(),
    })
}

fn format_from_path(path: &Path) -> Option<Format> {
    let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
    [Format::Yaml, Format::Hcl]
        .into_iter()
        .find(|format| format.extensions().contains(&ext.as_str()))
}
