//! Maps Terraform rule-group resources onto rule namespaces.
//!
//! Two resource types are understood:
//!
//! ```hcl
//! resource "loki_rule_group_alerting" "api" {
//!   name      = "api-alerts"
//!   namespace = "api"
//!   rule {
//!     alert = "HighErrorRate"
//!     expr  = "sum(rate({app=\"api\"} |= \"error\" [5m])) > 10"
//!     for   = "5m"
//!   }
//! }
//! ```
//!
//! and `loki_rule_group_recording` with `record` rules. Each resource becomes
//! one group; groups are bucketed by `namespace` in order of first appearance.

use serde_json::{Map, Value};

use crate::domain::error::RuleError;
use crate::domain::rules::{RuleGroup, RuleNamespace};

pub const ALERTING_RESOURCE: &str = "loki_rule_group_alerting";
pub const RECORDING_RESOURCE: &str = "loki_rule_group_recording";
pub const DEFAULT_NAMESPACE: &str = "default";

const GROUP_ATTRIBUTES: [&str; 3] = ["name", "interval", "limit"];

/// Extracts rule namespaces from an HCL document already converted to JSON.
///
/// Resource-level attributes other than `name`, `namespace`, `interval`,
/// `limit` and `rule` are ignored; unknown keys inside `rule` blocks fail.
pub fn namespaces_from_terraform(document: &Value) -> Result<Vec<RuleNamespace>, RuleError> {
    let mut namespaces: Vec<RuleNamespace> = Vec::new();

    for resources in objects(document.get("resource")) {
        for (resource_type, instances) in resources {
            if resource_type != ALERTING_RESOURCE && resource_type != RECORDING_RESOURCE {
                continue;
            }
            for by_name in objects(Some(instances)) {
                for (resource_name, body) in by_name {
                    let address = format!("{resource_type}.{resource_name}");
                    for body in objects(Some(body)) {
                        let (namespace, group) = group_from_resource(&address, body)?;
                        push_group(&mut namespaces, namespace, group);
                    }
                }
            }
        }
    }

    Ok(namespaces)
}

fn group_from_resource(
    address: &str,
    body: &Map<String, Value>,
) -> Result<(String, RuleGroup), RuleError> {
    let namespace = match body.get("namespace") {
        None => DEFAULT_NAMESPACE.to_string(),
        Some(Value::String(namespace)) => namespace.clone(),
        Some(_) => {
            return Err(RuleError::Resource {
                address: address.to_string(),
                message: "attribute `namespace` must be a string".to_string(),
            });
        }
    };

    let mut group = Map::new();
    for key in GROUP_ATTRIBUTES {
        if let Some(value) = body.get(key) {
            group.insert(key.to_string(), value.clone());
        }
    }
    let rules: Vec<Value> = objects(body.get("rule"))
        .into_iter()
        .map(|rule| Value::Object(rule.clone()))
        .collect();
    group.insert("rules".to_string(), Value::Array(rules));

    let group = serde_json::from_value(Value::Object(group)).map_err(|err| RuleError::Resource {
        address: address.to_string(),
        message: err.to_string(),
    })?;
    Ok((namespace, group))
}

fn push_group(namespaces: &mut Vec<RuleNamespace>, namespace: String, group: RuleGroup) {
    match namespaces
        .iter_mut()
        .find(|existing| existing.namespace.as_deref() == Some(namespace.as_str()))
    {
        Some(existing) => existing.groups.push(group),
        None => namespaces.push(RuleNamespace {
            namespace: Some(namespace),
            groups: vec![group],
        }),
    }
}

/// Repeated HCL blocks may surface as a single object or an array of objects.
fn objects(value: Option<&Value>) -> Vec<&Map<String, Value>> {
    match value {
        Some(Value::Object(map)) => vec![map],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    }
}
