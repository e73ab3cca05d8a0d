//! Output node parsing

use super::value::entry_to_attr;
use crate::error::{ManifestError, Result};
use crate::model::OutputDecl;
use kdl::KdlNode;

/// Parse an `output "name" { value ... }` node.
pub fn parse_output(node: &KdlNode) -> Result<OutputDecl> {
    let name = node
        .entries()
        .first()
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| {
            ManifestError::InvalidDeclaration("output requires a name".to_string())
        })?
        .to_string();

    let value_node = node
        .children()
        .and_then(|c| c.nodes().iter().find(|n| n.name().value() == "value"))
        .ok_or_else(|| {
            ManifestError::InvalidDeclaration(format!("output '{}' requires a value", name))
        })?;

    let entry = value_node.entries().first().ok_or_else(|| {
        ManifestError::InvalidDeclaration(format!("output '{}' has an empty value", name))
    })?;

    Ok(OutputDecl::new(name, entry_to_attr(entry)?))
}
