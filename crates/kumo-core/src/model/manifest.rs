//! Manifest: the fully loaded desired state of a project.

use super::output::OutputDecl;
use super::provider::ProviderConfig;
use super::resource::{Address, ResourceNode};
use crate::error::{ManifestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One configuration revision: every declared resource, output and provider
/// block of a project, after template expansion and parsing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Project name.
    pub name: String,

    /// Resources keyed by rendered address (`type.name`).
    pub resources: BTreeMap<String, ResourceNode>,

    /// Named outputs exposed after reconciliation.
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputDecl>,

    /// Provider blocks keyed by provider name.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Project-level variables (already applied during template expansion,
    /// kept for inspection).
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

impl Manifest {
    pub fn get(&self, address: &Address) -> Option<&ResourceNode> {
        self.resources.get(&address.to_string())
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.resources.contains_key(&address.to_string())
    }

    /// Insert a resource, rejecting duplicate addresses.
    pub fn add_resource(&mut self, node: ResourceNode) -> Result<()> {
        let key = node.address.to_string();
        if self.resources.contains_key(&key) {
            return Err(ManifestError::DuplicateResource(key));
        }
        self.resources.insert(key, node);
        Ok(())
    }

    /// Resources in stable address order.
    pub fn iter_resources(&self) -> impl Iterator<Item = &ResourceNode> {
        self.resources.values()
    }

    /// Check the syntactic properties of the manifest that do not require
    /// provider or state knowledge: every reference and depends_on target
    /// resolves to a declared resource, every resource names a declared
    /// provider, every output reference resolves.
    pub fn validate(&self) -> Result<()> {
        for node in self.resources.values() {
            for (_, r) in node.references() {
                if !self.contains(&r.target) {
                    return Err(ManifestError::UnknownReference {
                        from: node.address.to_string(),
                        to: r.target.to_string(),
                    });
                }
            }
            for dep in &node.depends_on {
                if !self.contains(dep) {
                    return Err(ManifestError::UnknownReference {
                        from: node.address.to_string(),
                        to: dep.to_string(),
                    });
                }
            }
            // The default provider may be used without an explicit block
            if !self.providers.contains_key(&node.provider)
                && node.provider != crate::parser::DEFAULT_PROVIDER
            {
                return Err(ManifestError::UnknownProvider {
                    resource: node.address.to_string(),
                    provider: node.provider.clone(),
                });
            }
        }

        for (name, output) in &self.outputs {
            if let Some(r) = output.value.as_reference()
                && !self.contains(&r.target)
            {
                return Err(ManifestError::UnknownOutputReference {
                    output: name.clone(),
                    to: r.target.to_string(),
                });
            }
        }

        Ok(())
    }
}
