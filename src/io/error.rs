use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("could not resolve input format from `{path}`; pass --from yaml|hcl or use a .yml, .yaml or .tf file")]
    UnsupportedPathExtension { path: String },

    #[error("input filepath does not exist: {path}")]
    MissingPath { path: String },

    #[error("could not read `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no data read from stdin")]
    StdinTerminal,

    #[error("input is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("hcl parse error: {0}")]
    HclParse(#[from] hcl::Error),

    #[error("json conversion error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml serialize error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
