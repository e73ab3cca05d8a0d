//! Resource declarations
//!
//! A resource is a single declared object identified by (type, logical
//! name). Its attributes are literals or references to another resource's
//! finalized attribute.

use crate::error::ManifestError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a resource: resource type plus logical name.
///
/// Rendered as `type.name`, e.g. `vpc.main`. Ordering is lexical on the
/// rendered form so independent operations always line up the same way.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
    pub resource_type: String,
    pub name: String,
}

impl Address {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    /// Parse `type.name` into an address.
    pub fn parse(s: &str) -> Result<Self, ManifestError> {
        let mut parts = s.splitn(2, '.');
        match (parts.next(), parts.next()) {
            (Some(t), Some(n)) if !t.is_empty() && !n.is_empty() => Ok(Self::new(t, n)),
            _ => Err(ManifestError::InvalidReference {
                reference: s.to_string(),
                message: "expected 'type.name'".to_string(),
            }),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// A reference to another resource's attribute: `type.name.attribute`.
///
/// The attribute may be provider-assigned (e.g. `id`), so references are
/// only resolvable once the target has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefPath {
    pub target: Address,
    pub attribute: String,
}

impl RefPath {
    /// Parse `type.name.attribute`. Attribute paths may themselves contain
    /// dots (`type.name.nested.key`).
    pub fn parse(s: &str) -> Result<Self, ManifestError> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() < 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(ManifestError::InvalidReference {
                reference: s.to_string(),
                message: "expected 'type.name.attribute'".to_string(),
            });
        }
        Ok(Self {
            target: Address::new(parts[0], parts[1]),
            attribute: parts[2..].join("."),
        })
    }
}

impl fmt::Display for RefPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.target, self.attribute)
    }
}

/// An attribute value: either a literal or a reference edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Literal(serde_json::Value),
    Reference(RefPath),
}

impl AttrValue {
    pub fn as_literal(&self) -> Option<&serde_json::Value> {
        match self {
            AttrValue::Literal(v) => Some(v),
            AttrValue::Reference(_) => None,
        }
    }

    pub fn as_reference(&self) -> Option<&RefPath> {
        match self {
            AttrValue::Literal(_) => None,
            AttrValue::Reference(r) => Some(r),
        }
    }
}

/// A declared resource node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceNode {
    pub address: Address,

    /// Provider integration this resource is managed by.
    pub provider: String,

    /// Attribute name to value. BTreeMap keeps serialization and diff
    /// ordering stable.
    pub attributes: BTreeMap<String, AttrValue>,

    /// Explicit ordering dependencies, in addition to reference edges.
    #[serde(default)]
    pub depends_on: Vec<Address>,
}

impl ResourceNode {
    pub fn new(address: Address, provider: impl Into<String>) -> Self {
        Self {
            address,
            provider: provider.into(),
            attributes: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    /// All reference edges leaving this node: (attribute name, reference).
    pub fn references(&self) -> impl Iterator<Item = (&str, &RefPath)> {
        self.attributes
            .iter()
            .filter_map(|(k, v)| v.as_reference().map(|r| (k.as_str(), r)))
    }

    /// Addresses this node depends on: reference targets plus depends_on.
    pub fn dependencies(&self) -> Vec<Address> {
        let mut deps: Vec<Address> = self
            .references()
            .map(|(_, r)| r.target.clone())
            .chain(self.depends_on.iter().cloned())
            .collect();
        deps.sort();
        deps.dedup();
        deps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parse() {
        let addr = Address::parse("vpc.main").unwrap();
        assert_eq!(addr.resource_type, "vpc");
        assert_eq!(addr.name, "main");
        assert_eq!(addr.to_string(), "vpc.main");
    }

    #[test]
    fn test_address_parse_rejects_bare_name() {
        assert!(Address::parse("vpc").is_err());
        assert!(Address::parse("").is_err());
        assert!(Address::parse("vpc.").is_err());
    }

    #[test]
    fn test_refpath_parse() {
        let r = RefPath::parse("vpc.main.id").unwrap();
        assert_eq!(r.target, Address::new("vpc", "main"));
        assert_eq!(r.attribute, "id");
    }

    #[test]
    fn test_refpath_parse_nested_attribute() {
        let r = RefPath::parse("bucket.assets.versioning.enabled").unwrap();
        assert_eq!(r.target, Address::new("bucket", "assets"));
        assert_eq!(r.attribute, "versioning.enabled");
    }

    #[test]
    fn test_refpath_parse_rejects_short_paths() {
        assert!(RefPath::parse("vpc.main").is_err());
        assert!(RefPath::parse("vpc..id").is_err());
    }

    #[test]
    fn test_dependencies_dedup() {
        let mut node = ResourceNode::new(Address::new("subnet", "public"), "local");
        node.attributes.insert(
            "vpc".to_string(),
            AttrValue::Reference(RefPath::parse("vpc.main.id").unwrap()),
        );
        node.attributes.insert(
            "vpc_cidr".to_string(),
            AttrValue::Reference(RefPath::parse("vpc.main.cidr").unwrap()),
        );
        node.depends_on.push(Address::new("vpc", "main"));

        // Two references plus depends_on collapse to one dependency
        assert_eq!(node.dependencies(), vec![Address::new("vpc", "main")]);
    }
}
