pub mod group;
pub mod node;

use serde::Deserialize;
use tracing::debug;

use crate::domain::error::RuleError;
use crate::domain::rules::RuleNamespace;
use crate::engine::expr::ExpressionParser;

pub use group::validate_groups;
pub use node::validate_rule_node;

/// Decodes every YAML document in `content` into a validated namespace.
///
/// Decoding is strict: unknown keys fail the document. The first document
/// that fails to decode or validate aborts the whole input and no
/// namespaces are returned; a decode failure yields exactly one error, a
/// validation failure yields all errors of that document.
pub fn parse_rules_bytes<P: ExpressionParser>(
    content: &[u8],
    parser: &P,
) -> Result<Vec<RuleNamespace>, Vec<RuleError>> {
    let mut namespaces = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_slice(content).enumerate() {
        // Empty, comment-only and trailing `---` documents decode as null.
        let Some(namespace) = Option::<RuleNamespace>::deserialize(document)
            .map_err(|err| vec![RuleError::from(err)])?
        else {
            continue;
        };

        let errors = validate_groups(&namespace.groups, parser);
        if !errors.is_empty() {
            debug!(document = index, errors = errors.len(), "rule document rejected");
            return Err(errors);
        }

        namespaces.push(namespace);
    }

    Ok(namespaces)
}
