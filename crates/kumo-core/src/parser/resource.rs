//! Resource node parsing

use super::value::{children_to_json, entry_to_attr, is_reference, kdl_value_to_json};
use crate::error::{ManifestError, Result};
use crate::model::{Address, AttrValue, ResourceNode};
use kdl::KdlNode;

/// Provider assumed when a resource does not name one.
pub const DEFAULT_PROVIDER: &str = "local";

/// Parse a `resource "type" "name" { ... }` node.
pub fn parse_resource(node: &KdlNode) -> Result<ResourceNode> {
    let mut args = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string());
    let (resource_type, name) = match (args.next(), args.next()) {
        (Some(t), Some(n)) => (t, n),
        _ => {
            return Err(ManifestError::InvalidDeclaration(
                "resource requires a type and a name".to_string(),
            ));
        }
    };

    let mut resource = ResourceNode::new(Address::new(resource_type, name), DEFAULT_PROVIDER);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "provider" => {
                    resource.provider = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_string())
                        .ok_or_else(|| {
                            ManifestError::InvalidDeclaration(format!(
                                "resource '{}': provider requires a name",
                                resource.address
                            ))
                        })?
                        .to_string();
                }
                "depends_on" | "depends-on" => {
                    for entry in child.entries() {
                        let raw = entry.value().as_string().ok_or_else(|| {
                            ManifestError::InvalidDeclaration(format!(
                                "resource '{}': depends_on takes 'type.name' strings",
                                resource.address
                            ))
                        })?;
                        resource.depends_on.push(Address::parse(raw)?);
                    }
                }
                attr => {
                    let value = parse_attribute(attr, child, &resource.address)?;
                    if let Some(value) = value {
                        resource.attributes.insert(attr.to_string(), value);
                    }
                }
            }
        }
    }

    Ok(resource)
}

/// Parse one attribute child. Returns None for empty marker nodes.
fn parse_attribute(
    attr: &str,
    child: &KdlNode,
    address: &Address,
) -> Result<Option<AttrValue>> {
    if let Some(grandchildren) = child.children() {
        return Ok(Some(AttrValue::Literal(children_to_json(grandchildren)?)));
    }
    match child.entries() {
        [] => Ok(None),
        [entry] => Ok(Some(entry_to_attr(entry)?)),
        entries => {
            if entries.iter().any(is_reference) {
                return Err(ManifestError::InvalidDeclaration(format!(
                    "resource '{}': references are not allowed in lists ('{}')",
                    address, attr
                )));
            }
            Ok(Some(AttrValue::Literal(serde_json::Value::Array(
                entries.iter().map(|e| kdl_value_to_json(e.value())).collect(),
            ))))
        }
    }
}
