//! KDL value conversion
//!
//! Scalar entries become JSON literals; an entry annotated `(ref)` becomes a
//! reference to another resource's attribute.

use crate::error::{ManifestError, Result};
use crate::model::{AttrValue, RefPath};
use kdl::{KdlDocument, KdlEntry, KdlValue};

/// Convert a KDL scalar to a JSON literal.
pub fn kdl_value_to_json(value: &KdlValue) -> serde_json::Value {
    if let Some(s) = value.as_string() {
        serde_json::Value::String(s.to_string())
    } else if let Some(i) = value.as_integer() {
        serde_json::Value::from(i as i64)
    } else if let Some(f) = value.as_float() {
        serde_json::Value::from(f)
    } else if let Some(b) = value.as_bool() {
        serde_json::Value::Bool(b)
    } else {
        serde_json::Value::Null
    }
}

/// True when the entry carries a `(ref)` type annotation.
pub fn is_reference(entry: &KdlEntry) -> bool {
    entry.ty().map(|t| t.value()) == Some("ref")
}

/// Convert a single entry to an attribute value, honoring `(ref)`.
pub fn entry_to_attr(entry: &KdlEntry) -> Result<AttrValue> {
    if is_reference(entry) {
        let raw = entry.value().as_string().ok_or_else(|| {
            ManifestError::InvalidDeclaration("(ref) values must be strings".to_string())
        })?;
        Ok(AttrValue::Reference(RefPath::parse(raw)?))
    } else {
        Ok(AttrValue::Literal(kdl_value_to_json(entry.value())))
    }
}

/// Convert a nested block to a JSON object.
///
/// Inside nested blocks only literals are allowed: a child with one argument
/// becomes a scalar, multiple arguments become an array, and a child with its
/// own block recurses.
pub fn children_to_json(children: &KdlDocument) -> Result<serde_json::Value> {
    let mut object = serde_json::Map::new();
    for child in children.nodes() {
        if child.entries().iter().any(is_reference) {
            return Err(ManifestError::InvalidDeclaration(format!(
                "references are not allowed inside nested blocks ('{}')",
                child.name().value()
            )));
        }
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
        object.insert(child.name().value().to_string(), value);
    }
    Ok(serde_json::Value::Object(object))
}
