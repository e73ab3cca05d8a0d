//! State differ
//!
//! Pure comparison of the desired resource set against the last-applied
//! snapshot, producing the change-set the executor runs.

use crate::error::Result;
use crate::plan::{Action, ActionType, Plan};
use crate::provider::ResourceSchema;
use crate::state::{ResourceRecord, StateSnapshot};
use kumo_core::{Address, AttrValue, DependencyGraph, Manifest, ResourceNode};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Schema lookup handed to the differ: (provider name, resource type) to
/// the attributes that force replacement.
#[derive(Debug, Clone, Default)]
pub struct SchemaIndex {
    schemas: HashMap<(String, String), ResourceSchema>,
}

impl SchemaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        provider: impl Into<String>,
        resource_type: impl Into<String>,
        schema: ResourceSchema,
    ) {
        self.schemas
            .insert((provider.into(), resource_type.into()), schema);
    }

    pub fn get(&self, provider: &str, resource_type: &str) -> ResourceSchema {
        self.schemas
            .get(&(provider.to_string(), resource_type.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Collect schemas for every resource in the manifest from a lookup
    /// function (usually `ProviderRegistry::schema_for`).
    pub fn for_manifest<F>(manifest: &Manifest, mut lookup: F) -> Self
    where
        F: FnMut(&str, &str) -> ResourceSchema,
    {
        let mut index = Self::new();
        for node in manifest.iter_resources() {
            let schema = lookup(&node.provider, &node.address.resource_type);
            index.insert(
                node.provider.clone(),
                node.address.resource_type.clone(),
                schema,
            );
        }
        index
    }
}

/// The state differ.
pub struct Differ {
    schemas: SchemaIndex,
}

impl Differ {
    pub fn new(schemas: SchemaIndex) -> Self {
        Self { schemas }
    }

    /// Diff desired state against the snapshot.
    ///
    /// Deletions come first in reverse dependency order (recorded edges),
    /// then the remaining actions in creation order. Desired nodes are
    /// walked in creation order so that a reference's target is classified
    /// before anything that points at it.
    pub fn plan(
        &self,
        manifest: &Manifest,
        graph: &DependencyGraph,
        snapshot: &StateSnapshot,
    ) -> Result<Plan> {
        let mut actions = Vec::new();

        // Resources present in state but gone from the declarations
        let doomed: Vec<&ResourceRecord> = snapshot
            .resources
            .values()
            .filter(|r| !manifest.contains(&r.address))
            .collect();
        let delete_graph = DependencyGraph::from_edges(
            doomed
                .iter()
                .map(|r| (r.address.clone(), r.depends_on.clone())),
        );
        let mut doomed_providers: std::collections::BTreeMap<Address, String> = doomed
            .iter()
            .map(|r| (r.address.clone(), r.provider.clone()))
            .collect();
        for address in delete_graph.destruction_order()? {
            if let Some(provider) = doomed_providers.remove(&address) {
                actions.push(Action {
                    address,
                    action_type: ActionType::Delete,
                    provider,
                    changed: vec![],
                });
            }
        }

        // Desired resources, targets before their dependents
        let mut pending: BTreeSet<Address> = BTreeSet::new();
        for address in graph.creation_order()? {
            let Some(node) = manifest.get(&address) else {
                continue;
            };
            let action = match snapshot.get(&address) {
                None => {
                    pending.insert(address.clone());
                    Action {
                        address,
                        action_type: ActionType::Create,
                        provider: node.provider.clone(),
                        changed: vec![],
                    }
                }
                Some(record) => {
                    let changed = changed_attributes(node, record, snapshot, &pending);
                    let action_type = if node.provider != record.provider {
                        // Moving a resource to another provider is always
                        // a replace
                        pending.insert(address.clone());
                        ActionType::Replace
                    } else if changed.is_empty() {
                        ActionType::NoOp
                    } else if self.forces_replace(node, &changed) {
                        pending.insert(address.clone());
                        ActionType::Replace
                    } else {
                        ActionType::Update
                    };
                    Action {
                        address,
                        action_type,
                        provider: node.provider.clone(),
                        changed,
                    }
                }
            };
            actions.push(action);
        }

        let plan = Plan::new(actions);
        debug!(summary = %plan.summary(), "Computed plan");
        Ok(plan)
    }

    fn forces_replace(&self, node: &ResourceNode, changed: &[String]) -> bool {
        let schema = self
            .schemas
            .get(&node.provider, &node.address.resource_type);
        changed.iter().any(|attr| schema.force_new.contains(attr))
    }
}

/// Attributes whose desired value differs from the recorded one.
///
/// References resolve against the snapshot; a reference whose target is
/// being created or replaced in this plan has no known value yet, so it is
/// conservatively counted as changed.
fn changed_attributes(
    node: &ResourceNode,
    record: &ResourceRecord,
    snapshot: &StateSnapshot,
    pending: &BTreeSet<Address>,
) -> Vec<String> {
    let mut changed = Vec::new();
    for (key, value) in &node.attributes {
        let differs = match value {
            AttrValue::Literal(desired) => record.attributes.get(key) != Some(desired),
            AttrValue::Reference(r) => {
                if pending.contains(&r.target) {
                    true
                } else {
                    match snapshot.get(&r.target).and_then(|t| t.attribute_path(&r.attribute)) {
                        Some(resolved) => record.attributes.get(key) != Some(resolved),
                        // Target exists but the attribute does not resolve;
                        // let the apply surface the real error
                        None => true,
                    }
                }
            }
        };
        if differs {
            changed.push(key.clone());
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use kumo_core::parse_kdl_string;

    fn manifest_from(kdl: &str) -> Manifest {
        parse_kdl_string(kdl, "test".to_string()).unwrap()
    }

    fn record(address: Address, attrs: &[(&str, serde_json::Value)]) -> ResourceRecord {
        let mut record = ResourceRecord::new(address, "lcl-test", "local");
        for (key, value) in attrs {
            record.attributes.insert(key.to_string(), value.clone());
        }
        record
    }

    fn plan_for(
        manifest: &Manifest,
        snapshot: &StateSnapshot,
        schemas: SchemaIndex,
    ) -> Plan {
        let graph = DependencyGraph::from_manifest(manifest).unwrap();
        Differ::new(schemas)
            .plan(manifest, &graph, snapshot)
            .unwrap()
    }

    #[test]
    fn test_fresh_project_is_all_creates() {
        let manifest = manifest_from(
            r#"
            resource "vpc" "main" { cidr "10.0.0.0/16" }
            resource "subnet" "public" { vpc (ref)"vpc.main.id" }
            "#,
        );
        let plan = plan_for(&manifest, &StateSnapshot::new(), SchemaIndex::new());

        let summary = plan.summary();
        assert_eq!(summary.create, 2);
        assert_eq!(summary.delete, 0);
        // Target precedes dependent
        assert_eq!(plan.actions[0].address, Address::new("vpc", "main"));
        assert_eq!(plan.actions[1].address, Address::new("subnet", "public"));
    }

    #[test]
    fn test_unchanged_resource_is_noop() {
        let manifest = manifest_from(r#"resource "vpc" "main" { cidr "10.0.0.0/16" }"#);
        let mut snapshot = StateSnapshot::new();
        snapshot.set_resource(record(
            Address::new("vpc", "main"),
            &[("cidr", serde_json::json!("10.0.0.0/16"))],
        ));

        let plan = plan_for(&manifest, &snapshot, SchemaIndex::new());
        assert!(!plan.has_changes);
        assert_eq!(plan.summary().no_change, 1);
    }

    #[test]
    fn test_changed_attribute_is_update() {
        let manifest = manifest_from(r#"resource "vpc" "main" { cidr "10.1.0.0/16" }"#);
        let mut snapshot = StateSnapshot::new();
        snapshot.set_resource(record(
            Address::new("vpc", "main"),
            &[("cidr", serde_json::json!("10.0.0.0/16"))],
        ));

        let plan = plan_for(&manifest, &snapshot, SchemaIndex::new());
        let action = &plan.actions[0];
        assert_eq!(action.action_type, ActionType::Update);
        assert_eq!(action.changed, vec!["cidr".to_string()]);
    }

    #[test]
    fn test_force_new_attribute_is_replace() {
        let manifest = manifest_from(r#"resource "vpc" "main" { cidr "10.1.0.0/16" }"#);
        let mut snapshot = StateSnapshot::new();
        snapshot.set_resource(record(
            Address::new("vpc", "main"),
            &[("cidr", serde_json::json!("10.0.0.0/16"))],
        ));

        let mut schemas = SchemaIndex::new();
        schemas.insert("local", "vpc", ResourceSchema::force_new(["cidr"]));

        let plan = plan_for(&manifest, &snapshot, schemas);
        assert_eq!(plan.actions[0].action_type, ActionType::Replace);
    }

    #[test]
    fn test_removed_resource_is_delete() {
        let manifest = manifest_from(r#"resource "vpc" "main" { cidr "10.0.0.0/16" }"#);
        let mut snapshot = StateSnapshot::new();
        snapshot.set_resource(record(
            Address::new("vpc", "main"),
            &[("cidr", serde_json::json!("10.0.0.0/16"))],
        ));
        snapshot.set_resource(record(Address::new("bucket", "old"), &[]));

        let plan = plan_for(&manifest, &snapshot, SchemaIndex::new());
        let summary = plan.summary();
        assert_eq!(summary.delete, 1);
        assert_eq!(summary.no_change, 1);
        assert_eq!(plan.actions[0].address, Address::new("bucket", "old"));
        assert_eq!(plan.actions[0].action_type, ActionType::Delete);
    }

    #[test]
    fn test_deletes_ordered_dependents_first() {
        // Both resources removed from the declarations; subnet recorded as
        // depending on vpc, so it must be deleted first
        let manifest = manifest_from("");
        let mut snapshot = StateSnapshot::new();
        snapshot.set_resource(record(Address::new("vpc", "main"), &[]));
        snapshot.set_resource(
            record(Address::new("subnet", "public"), &[])
                .with_depends_on(vec![Address::new("vpc", "main")]),
        );

        let plan = plan_for(&manifest, &snapshot, SchemaIndex::new());
        assert_eq!(plan.actions[0].address, Address::new("subnet", "public"));
        assert_eq!(plan.actions[1].address, Address::new("vpc", "main"));
    }

    #[test]
    fn test_reference_to_replaced_target_marks_dependent_updated() {
        let manifest = manifest_from(
            r#"
            resource "vpc" "main" { cidr "10.1.0.0/16" }
            resource "subnet" "public" { vpc (ref)"vpc.main.id" }
            "#,
        );
        let mut snapshot = StateSnapshot::new();
        snapshot.set_resource(record(
            Address::new("vpc", "main"),
            &[
                ("cidr", serde_json::json!("10.0.0.0/16")),
                ("id", serde_json::json!("lcl-vpc-1")),
            ],
        ));
        snapshot.set_resource(record(
            Address::new("subnet", "public"),
            &[("vpc", serde_json::json!("lcl-vpc-1"))],
        ));

        let mut schemas = SchemaIndex::new();
        schemas.insert("local", "vpc", ResourceSchema::force_new(["cidr"]));

        let plan = plan_for(&manifest, &snapshot, schemas);
        let by_address = |addr: Address| {
            plan.actions
                .iter()
                .find(|a| a.address == addr)
                .unwrap()
                .action_type
        };
        assert_eq!(by_address(Address::new("vpc", "main")), ActionType::Replace);
        // The subnet's reference target is being replaced, so its value is
        // unknown until apply
        assert_eq!(
            by_address(Address::new("subnet", "public")),
            ActionType::Update
        );
    }

    #[test]
    fn test_satisfied_reference_is_noop() {
        let manifest = manifest_from(
            r#"
            resource "vpc" "main" { cidr "10.0.0.0/16" }
            resource "subnet" "public" { vpc (ref)"vpc.main.id" }
            "#,
        );
        let mut snapshot = StateSnapshot::new();
        snapshot.set_resource(record(
            Address::new("vpc", "main"),
            &[
                ("cidr", serde_json::json!("10.0.0.0/16")),
                ("id", serde_json::json!("lcl-vpc-1")),
            ],
        ));
        snapshot.set_resource(record(
            Address::new("subnet", "public"),
            &[("vpc", serde_json::json!("lcl-vpc-1"))],
        ));

        let plan = plan_for(&manifest, &snapshot, SchemaIndex::new());
        assert!(!plan.has_changes);
    }

    #[test]
    fn test_provider_move_is_replace() {
        let manifest = manifest_from(r#"resource "vpc" "main" { cidr "10.0.0.0/16" }"#);
        let mut snapshot = StateSnapshot::new();
        let mut old = record(
            Address::new("vpc", "main"),
            &[("cidr", serde_json::json!("10.0.0.0/16"))],
        );
        old.provider = "sakura-cloud".to_string();
        snapshot.set_resource(old);

        let plan = plan_for(&manifest, &snapshot, SchemaIndex::new());
        assert_eq!(plan.actions[0].action_type, ActionType::Replace);
    }
}
