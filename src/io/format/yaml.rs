use std::io::Write;

use crate::domain::rules::RuleNamespace;
use crate::io::IoError;

/// Writes namespaces as a multi-document YAML stream.
pub fn write_namespaces<'a, W, I>(mut writer: W, namespaces: I) -> Result<(), IoError>
where
    W: Write,
    I: IntoIterator<Item = &'a RuleNamespace>,
{
    for (index, namespace) in namespaces.into_iter().enumerate() {
        if index > 0 {
            writer.write_all(b"---\n")?;
        }
        serde_yaml::to_writer(&mut writer, namespace)?;
    }
    Ok(())
}
