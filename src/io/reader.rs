use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::io::{Format, IoError};

/// Expands an input path into the rule files to read.
///
/// Directories are scanned one level deep for files matching `format`,
/// in file-name order.
pub fn discover_sources(path: &Path, format: Format) -> Result<Vec<PathBuf>, IoError> {
    if !path.exists() {
        return Err(IoError::MissingPath {
            path: path.display().to_string(),
        });
    }
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    debug!(directory = %path.display(), "reading directory");
    let entries = fs::read_dir(path).map_err(|source| read_error(path, source))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry_path = entry.map_err(|source| read_error(path, source))?.path();
        if entry_path.is_file() && format.matches_path(&entry_path) {
            files.push(entry_path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn read_file(path: &Path) -> Result<Vec<u8>, IoError> {
    debug!(file = %path.display(), "reading file");
    fs::read(path).map_err(|source| read_error(path, source))
}

pub fn read_all<R: Read>(mut reader: R) -> Result<Vec<u8>, IoError> {
    let mut content = Vec::new();
    reader.read_to_end(&mut content)?;
    Ok(content)
}

fn read_error(path: &Path, source: std::io::Error) -> IoError {
    IoError::Read {
        path: path.display().to_string(),
        source,
    }
}
