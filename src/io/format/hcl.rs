use serde_json::Value;

use crate::io::IoError;

/// Parses an HCL body into its JSON-shaped representation.
pub fn read_hcl(content: &[u8]) -> Result<Value, IoError> {
    let text = std::str::from_utf8(content)?;
    let body: hcl::Value = hcl::from_str(text)?;
    Ok(serde_json::to_value(body)?)
}
