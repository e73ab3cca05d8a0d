//! Provider block parsing

use super::value::{children_to_json, kdl_value_to_json};
use crate::error::{ManifestError, Result};
use crate::model::ProviderConfig;
use kdl::KdlNode;

/// Parse a `provider "name" { ... }` node. Settings are kept opaque; each
/// provider integration interprets its own block.
pub fn parse_provider(node: &KdlNode) -> Result<(String, ProviderConfig)> {
    let name = node
        .entries()
        .first()
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| {
            ManifestError::InvalidDeclaration("provider requires a name".to_string())
        })?
        .to_string();

    let mut provider = ProviderConfig::new(name.clone());

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let key = child.name().value().to_string();
            let value = if let Some(grandchildren) = child.children() {
                children_to_json(grandchildren)?
            } else {
                match child.entries() {
                    [] => continue,
                    [entry] => kdl_value_to_json(entry.value()),
                    entries => serde_json::Value::Array(
                        entries.iter().map(|e| kdl_value_to_json(e.value())).collect(),
                    ),
                }
            };
            provider.config.insert(key, value);
        }
    }

    Ok((name, provider))
}
