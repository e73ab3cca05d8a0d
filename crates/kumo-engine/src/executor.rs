//! Plan executor
//!
//! Applies a change-set in dependency order. Deletions run first, dependents
//! before their targets; then creates, updates and replaces walk the forward
//! order. Independent subgraphs run concurrently up to a parallelism bound,
//! while a dependency chain stays serialized. Every successful node apply is
//! written to the snapshot immediately, so an aborted run leaves state
//! reflecting exactly the nodes that completed.

use crate::error::{EngineError, ProviderError, Result};
use crate::plan::{Action, ActionType, ApplyResult, Plan};
use crate::provider::{ApplyRequest, AppliedResource, Provider, ProviderRegistry, RetryConfig};
use crate::state::{ResourceRecord, StateManager, StateSnapshot};
use kumo_core::{Address, AttrValue, DependencyGraph, Manifest};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Executor tuning knobs.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Maximum number of resources applied at the same time.
    pub parallelism: usize,

    /// Retry policy for transient provider failures.
    pub retry: RetryConfig,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            parallelism: 4,
            retry: RetryConfig::default(),
        }
    }
}

/// Applies plans through registered providers.
pub struct Executor {
    registry: Arc<ProviderRegistry>,
    options: ExecutorOptions,
}

/// One schedulable unit: the action plus everything needed to run it
/// without touching the manifest again.
struct PhaseTask {
    action: Action,
    prereqs: BTreeSet<Address>,
    attributes: BTreeMap<String, AttrValue>,
    depends_on: Vec<Address>,
}

enum TaskOutcome {
    Applied(AppliedResource),
    Deleted,
}

struct TaskCompletion {
    action: Action,
    depends_on: Vec<Address>,
    outcome: std::result::Result<TaskOutcome, ProviderError>,
}

impl Executor {
    pub fn new(registry: Arc<ProviderRegistry>, options: ExecutorOptions) -> Self {
        Self { registry, options }
    }

    /// Apply a plan and persist the resulting state.
    ///
    /// Failures never abort in-flight nodes: scheduling stops, running
    /// applies finish and are recorded, and everything not attempted is
    /// reported as skipped. Cancellation behaves the same way.
    pub async fn apply(
        &self,
        manifest: &Manifest,
        graph: &DependencyGraph,
        plan: &Plan,
        state: &StateManager,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<ApplyResult> {
        let started = std::time::Instant::now();
        let lock = state.acquire_lock().await?;
        let mut snapshot = state.load().await?;
        let mut result = ApplyResult::new();

        // Phase 1: deletions, dependents before targets
        let delete_tasks = build_delete_phase(plan, &snapshot);
        if !delete_tasks.is_empty() {
            info!(count = delete_tasks.len(), "Executing delete phase");
        }
        self.run_phase(delete_tasks, &mut snapshot, state, &mut result, &mut cancel)
            .await?;

        // Phase 2: creates, updates and replaces in creation order
        let apply_tasks = build_apply_phase(plan, manifest, graph);
        if result.failed.is_empty() && !*cancel.borrow() {
            if !apply_tasks.is_empty() {
                info!(count = apply_tasks.len(), "Executing apply phase");
            }
            self.run_phase(apply_tasks, &mut snapshot, state, &mut result, &mut cancel)
                .await?;
        } else {
            result
                .skipped
                .extend(apply_tasks.iter().map(|t| t.action.address.to_string()));
        }

        // Outputs are only reconciled from a fully applied snapshot
        if result.is_success() {
            snapshot.outputs = resolve_outputs(manifest, &snapshot)?;
            state.save(&mut snapshot).await?;
        }

        lock.release().await?;
        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            skipped = result.skipped.len(),
            duration_ms = result.duration_ms,
            "Apply finished"
        );
        Ok(result)
    }

    /// Run one phase with bounded parallelism.
    async fn run_phase(
        &self,
        tasks: Vec<PhaseTask>,
        snapshot: &mut StateSnapshot,
        state: &StateManager,
        result: &mut ApplyResult,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let mut waiting: BTreeMap<Address, PhaseTask> = BTreeMap::new();
        let mut remaining: BTreeMap<Address, BTreeSet<Address>> = BTreeMap::new();
        let mut dependents: BTreeMap<Address, Vec<Address>> = BTreeMap::new();
        for task in tasks {
            let address = task.action.address.clone();
            for prereq in &task.prereqs {
                dependents
                    .entry(prereq.clone())
                    .or_default()
                    .push(address.clone());
            }
            remaining.insert(address.clone(), task.prereqs.clone());
            waiting.insert(address, task);
        }

        let mut ready: BTreeSet<Address> = remaining
            .iter()
            .filter(|(_, prereqs)| prereqs.is_empty())
            .map(|(addr, _)| addr.clone())
            .collect();

        let mut join_set: JoinSet<TaskCompletion> = JoinSet::new();
        let mut halted = *cancel.borrow();
        let mut cancel_closed = false;

        loop {
            // Schedule whatever is ready, up to the parallelism bound
            while !halted && join_set.len() < self.options.parallelism {
                let Some(address) = ready.iter().next().cloned() else {
                    break;
                };
                ready.remove(&address);
                let Some(task) = waiting.remove(&address) else {
                    continue;
                };
                let action_type = task.action.action_type;
                if let Err(e) = self.spawn_task(task, snapshot, &mut join_set) {
                    result.add_failure(&address, action_type, e.to_string());
                    halted = true;
                }
            }

            if join_set.is_empty() {
                break;
            }

            tokio::select! {
                joined = join_set.join_next() => {
                    let Some(joined) = joined else { continue };
                    let completion = joined
                        .map_err(|e| EngineError::State(format!("apply task panicked: {e}")))?;
                    let (address, success) = self
                        .record_completion(completion, snapshot, state, result)
                        .await?;
                    if !success {
                        if !halted {
                            debug!(address = %address, "Halting after failure");
                            halted = true;
                        }
                    } else if !halted {
                        // Unlock dependents of the node that just finished
                        for dependent in dependents.remove(&address).unwrap_or_default() {
                            if let Some(prereqs) = remaining.get_mut(&dependent) {
                                prereqs.remove(&address);
                                if prereqs.is_empty() && waiting.contains_key(&dependent) {
                                    ready.insert(dependent);
                                }
                            }
                        }
                    }
                }
                changed = cancel.changed(), if !cancel_closed => {
                    match changed {
                        Ok(()) => {
                            if *cancel.borrow() && !halted {
                                info!("Cancellation requested, draining in-flight applies");
                                halted = true;
                            }
                        }
                        Err(_) => cancel_closed = true,
                    }
                }
            }
        }

        result
            .skipped
            .extend(waiting.keys().map(ToString::to_string));
        Ok(())
    }

    /// Resolve references against the snapshot and hand the node to its
    /// provider on a worker task.
    fn spawn_task(
        &self,
        task: PhaseTask,
        snapshot: &StateSnapshot,
        join_set: &mut JoinSet<TaskCompletion>,
    ) -> Result<()> {
        let provider = self.registry.get(&task.action.provider)?;
        let prior = snapshot.get(&task.action.address).cloned();
        let request = match task.action.action_type {
            ActionType::Delete => None,
            _ => Some(ApplyRequest {
                address: task.action.address.clone(),
                attributes: resolve_attributes(
                    &task.action.address,
                    &task.attributes,
                    snapshot,
                )?,
            }),
        };
        let retry = self.options.retry.clone();

        debug!(address = %task.action.address, action = %task.action.action_type, "Dispatching");
        join_set.spawn(async move {
            let outcome =
                apply_with_retry(provider, &task.action, request.as_ref(), prior.as_ref(), &retry)
                    .await;
            TaskCompletion {
                action: task.action,
                depends_on: task.depends_on,
                outcome,
            }
        });
        Ok(())
    }

    /// Fold one finished task into the snapshot and result, persisting the
    /// snapshot on success. Returns the address and whether it succeeded.
    async fn record_completion(
        &self,
        completion: TaskCompletion,
        snapshot: &mut StateSnapshot,
        state: &StateManager,
        result: &mut ApplyResult,
    ) -> Result<(Address, bool)> {
        let action = completion.action;
        let mut success = true;
        match completion.outcome {
            Ok(TaskOutcome::Applied(applied)) => {
                let created_at = snapshot
                    .get(&action.address)
                    .map(|r| r.created_at)
                    .unwrap_or_else(chrono::Utc::now);
                let mut record =
                    ResourceRecord::new(action.address.clone(), applied.id.clone(), &action.provider)
                        .with_depends_on(completion.depends_on);
                record.attributes = applied.attributes;
                record.created_at = created_at;
                snapshot.set_resource(record);
                state.save(snapshot).await?;
                result.add_success(
                    &action.address,
                    action.action_type,
                    format!("{} ({})", action.action_type, applied.id),
                );
            }
            Ok(TaskOutcome::Deleted) => {
                snapshot.remove_resource(&action.address);
                state.save(snapshot).await?;
                result.add_success(&action.address, action.action_type, "deleted".to_string());
            }
            Err(e) => {
                warn!(address = %action.address, error = %e, "Apply failed");
                result.add_failure(&action.address, action.action_type, e.to_string());
                success = false;
            }
        }
        Ok((action.address, success))
    }
}

/// Run one provider operation with transient-failure retries.
async fn apply_with_retry(
    provider: Arc<dyn Provider>,
    action: &Action,
    request: Option<&ApplyRequest>,
    prior: Option<&ResourceRecord>,
    retry: &RetryConfig,
) -> std::result::Result<TaskOutcome, ProviderError> {
    let mut attempt = 1u32;
    let mut delay = retry.initial_delay;
    loop {
        let outcome = apply_once(provider.as_ref(), action, request, prior).await;
        match outcome {
            Err(e) if e.is_transient() && attempt < retry.max_attempts => {
                warn!(
                    address = %action.address,
                    attempt,
                    max_attempts = retry.max_attempts,
                    error = %e,
                    "Transient provider failure, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = retry.next_delay(delay);
                attempt += 1;
            }
            other => return other,
        }
    }
}

async fn apply_once(
    provider: &dyn Provider,
    action: &Action,
    request: Option<&ApplyRequest>,
    prior: Option<&ResourceRecord>,
) -> std::result::Result<TaskOutcome, ProviderError> {
    let missing = || ProviderError::Terminal("internal: incomplete apply request".to_string());
    match action.action_type {
        ActionType::Create => {
            let request = request.ok_or_else(missing)?;
            Ok(TaskOutcome::Applied(provider.create(request).await?))
        }
        ActionType::Update => {
            let request = request.ok_or_else(missing)?;
            let prior = prior.ok_or_else(missing)?;
            Ok(TaskOutcome::Applied(provider.update(request, prior).await?))
        }
        ActionType::Replace => {
            // Replace is delete-then-create on the same node
            let request = request.ok_or_else(missing)?;
            let prior = prior.ok_or_else(missing)?;
            provider.delete(prior).await?;
            Ok(TaskOutcome::Applied(provider.create(request).await?))
        }
        ActionType::Delete => {
            let prior = prior.ok_or_else(missing)?;
            provider.delete(prior).await?;
            Ok(TaskOutcome::Deleted)
        }
        ActionType::NoOp => Err(ProviderError::Terminal(
            "internal: no-op action scheduled".to_string(),
        )),
    }
}

/// Deletions wait on their recorded dependents.
fn build_delete_phase(plan: &Plan, snapshot: &StateSnapshot) -> Vec<PhaseTask> {
    let deletes: BTreeSet<Address> = plan
        .actions_by_type(ActionType::Delete)
        .iter()
        .map(|a| a.address.clone())
        .collect();

    plan.actions_by_type(ActionType::Delete)
        .into_iter()
        .map(|action| {
            // X waits for every doomed record that depended on X
            let prereqs: BTreeSet<Address> = snapshot
                .resources
                .values()
                .filter(|r| deletes.contains(&r.address) && r.depends_on.contains(&action.address))
                .map(|r| r.address.clone())
                .collect();
            PhaseTask {
                action: action.clone(),
                prereqs,
                attributes: BTreeMap::new(),
                depends_on: Vec::new(),
            }
        })
        .collect()
}

/// Creates, updates and replaces wait on their in-plan dependencies.
fn build_apply_phase(plan: &Plan, manifest: &Manifest, graph: &DependencyGraph) -> Vec<PhaseTask> {
    let members: BTreeSet<Address> = plan
        .actions
        .iter()
        .filter(|a| {
            matches!(
                a.action_type,
                ActionType::Create | ActionType::Update | ActionType::Replace
            )
        })
        .map(|a| a.address.clone())
        .collect();

    plan.actions
        .iter()
        .filter(|a| members.contains(&a.address))
        .map(|action| {
            let depends_on = graph.dependencies_of(&action.address);
            // Unchanged dependencies are already finalized; only wait on
            // ones being applied in this run
            let prereqs: BTreeSet<Address> = depends_on
                .iter()
                .filter(|d| members.contains(d))
                .cloned()
                .collect();
            let attributes = manifest
                .get(&action.address)
                .map(|n| n.attributes.clone())
                .unwrap_or_default();
            PhaseTask {
                action: action.clone(),
                prereqs,
                attributes,
                depends_on,
            }
        })
        .collect()
}

/// Replace references with the finalized values of their targets.
pub fn resolve_attributes(
    address: &Address,
    attributes: &BTreeMap<String, AttrValue>,
    snapshot: &StateSnapshot,
) -> Result<BTreeMap<String, serde_json::Value>> {
    let mut resolved = BTreeMap::new();
    for (key, value) in attributes {
        let resolved_value = match value {
            AttrValue::Literal(v) => v.clone(),
            AttrValue::Reference(r) => snapshot
                .get(&r.target)
                .and_then(|t| t.attribute_path(&r.attribute))
                .cloned()
                .ok_or_else(|| EngineError::UnresolvedReference {
                    from: address.to_string(),
                    to: r.to_string(),
                })?,
        };
        resolved.insert(key.clone(), resolved_value);
    }
    Ok(resolved)
}

/// Evaluate declared outputs against the snapshot.
pub fn resolve_outputs(
    manifest: &Manifest,
    snapshot: &StateSnapshot,
) -> Result<BTreeMap<String, serde_json::Value>> {
    let mut outputs = BTreeMap::new();
    for (name, output) in &manifest.outputs {
        let value = match &output.value {
            AttrValue::Literal(v) => v.clone(),
            AttrValue::Reference(r) => snapshot
                .get(&r.target)
                .and_then(|t| t.attribute_path(&r.attribute))
                .cloned()
                .ok_or_else(|| EngineError::UnresolvedReference {
                    from: format!("output.{name}"),
                    to: r.to_string(),
                })?,
        };
        outputs.insert(name.clone(), value);
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{Differ, SchemaIndex};
    use crate::provider::ResourceSchema;
    use kumo_core::parse_kdl_string;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    #[derive(Default)]
    struct MockProvider {
        log: Mutex<Vec<String>>,
        transient_failures: Mutex<HashMap<String, u32>>,
        terminal_failures: Mutex<HashSet<String>>,
    }

    impl MockProvider {
        fn log_entries(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn fail_transient(&self, address: &str, times: u32) {
            self.transient_failures
                .lock()
                .unwrap()
                .insert(address.to_string(), times);
        }

        fn fail_terminal(&self, address: &str) {
            self.terminal_failures
                .lock()
                .unwrap()
                .insert(address.to_string());
        }

        fn record(&self, op: &str, address: &Address) {
            self.log.lock().unwrap().push(format!("{op} {address}"));
        }

        fn check(&self, address: &Address) -> std::result::Result<(), ProviderError> {
            let key = address.to_string();
            if self.terminal_failures.lock().unwrap().contains(&key) {
                return Err(ProviderError::Terminal(format!("{key} is broken")));
            }
            let mut transients = self.transient_failures.lock().unwrap();
            if let Some(count) = transients.get_mut(&key) {
                if *count > 0 {
                    *count -= 1;
                    return Err(ProviderError::Transient(format!("{key} flaked")));
                }
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "local"
        }

        fn schema(&self, _resource_type: &str) -> ResourceSchema {
            ResourceSchema::default()
        }

        async fn create(
            &self,
            request: &ApplyRequest,
        ) -> std::result::Result<AppliedResource, ProviderError> {
            self.record("create", &request.address);
            self.check(&request.address)?;
            let id = format!("mock-{}", request.address);
            let mut attributes = request.attributes.clone();
            attributes.insert("id".to_string(), serde_json::json!(id));
            Ok(AppliedResource { id, attributes })
        }

        async fn update(
            &self,
            request: &ApplyRequest,
            prior: &ResourceRecord,
        ) -> std::result::Result<AppliedResource, ProviderError> {
            self.record("update", &request.address);
            self.check(&request.address)?;
            let mut attributes = request.attributes.clone();
            attributes.insert("id".to_string(), serde_json::json!(prior.id.clone()));
            Ok(AppliedResource {
                id: prior.id.clone(),
                attributes,
            })
        }

        async fn delete(
            &self,
            prior: &ResourceRecord,
        ) -> std::result::Result<(), ProviderError> {
            self.record("delete", &prior.address);
            self.check(&prior.address)?;
            Ok(())
        }
    }

    struct Harness {
        registry: Arc<ProviderRegistry>,
        provider: Arc<MockProvider>,
        state: StateManager,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = tempdir().unwrap();
        let provider = Arc::new(MockProvider::default());
        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone());
        Harness {
            registry: Arc::new(registry),
            provider,
            state: StateManager::new(dir.path()),
            _dir: dir,
        }
    }

    fn test_options(parallelism: usize) -> ExecutorOptions {
        ExecutorOptions {
            parallelism,
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                backoff_multiplier: 2.0,
            },
        }
    }

    async fn apply_kdl(
        h: &Harness,
        kdl: &str,
        schemas: SchemaIndex,
        parallelism: usize,
        cancelled: bool,
    ) -> (ApplyResult, StateSnapshot) {
        let manifest = parse_kdl_string(kdl, "test".to_string()).unwrap();
        let graph = DependencyGraph::from_manifest(&manifest).unwrap();
        let snapshot = h.state.load().await.unwrap();
        let plan = Differ::new(schemas)
            .plan(&manifest, &graph, &snapshot)
            .unwrap();

        let executor = Executor::new(h.registry.clone(), test_options(parallelism));
        let (tx, rx) = watch::channel(cancelled);
        let result = executor
            .apply(&manifest, &graph, &plan, &h.state, rx)
            .await
            .unwrap();
        drop(tx);
        (result, h.state.load().await.unwrap())
    }

    #[tokio::test]
    async fn test_create_in_dependency_order_and_resolve_references() {
        let h = harness();
        let (result, snapshot) = apply_kdl(
            &h,
            r#"
            resource "subnet" "public" { vpc (ref)"vpc.main.id" }
            resource "vpc" "main" { cidr "10.0.0.0/16" }
            "#,
            SchemaIndex::new(),
            2,
            false,
        )
        .await;

        assert!(result.is_success());
        assert_eq!(result.succeeded.len(), 2);

        let log = h.provider.log_entries();
        assert_eq!(log, vec!["create vpc.main", "create subnet.public"]);

        // The subnet saw the vpc's assigned id, not the reference
        let subnet = snapshot.get(&Address::new("subnet", "public")).unwrap();
        assert_eq!(
            subnet.attributes.get("vpc"),
            Some(&serde_json::json!("mock-vpc.main"))
        );
        assert_eq!(subnet.depends_on, vec![Address::new("vpc", "main")]);
    }

    #[tokio::test]
    async fn test_second_apply_is_noop() {
        let h = harness();
        let kdl = r#"resource "vpc" "main" { cidr "10.0.0.0/16" }"#;
        apply_kdl(&h, kdl, SchemaIndex::new(), 2, false).await;
        let (result, _) = apply_kdl(&h, kdl, SchemaIndex::new(), 2, false).await;

        assert!(result.is_success());
        assert!(result.succeeded.is_empty());
        // No second provider call happened
        assert_eq!(h.provider.log_entries(), vec!["create vpc.main"]);
    }

    #[tokio::test]
    async fn test_update_keeps_identity() {
        let h = harness();
        apply_kdl(
            &h,
            r#"resource "vpc" "main" { cidr "10.0.0.0/16" }"#,
            SchemaIndex::new(),
            2,
            false,
        )
        .await;
        let (result, snapshot) = apply_kdl(
            &h,
            r#"resource "vpc" "main" { cidr "10.1.0.0/16" }"#,
            SchemaIndex::new(),
            2,
            false,
        )
        .await;

        assert!(result.is_success());
        assert_eq!(
            h.provider.log_entries(),
            vec!["create vpc.main", "update vpc.main"]
        );
        let vpc = snapshot.get(&Address::new("vpc", "main")).unwrap();
        assert_eq!(vpc.id, "mock-vpc.main");
        assert_eq!(
            vpc.attributes.get("cidr"),
            Some(&serde_json::json!("10.1.0.0/16"))
        );
    }

    #[tokio::test]
    async fn test_replace_deletes_then_creates() {
        let h = harness();
        let mut schemas = SchemaIndex::new();
        schemas.insert("local", "vpc", ResourceSchema::force_new(["cidr"]));

        apply_kdl(
            &h,
            r#"resource "vpc" "main" { cidr "10.0.0.0/16" }"#,
            schemas.clone(),
            2,
            false,
        )
        .await;
        let (result, _) = apply_kdl(
            &h,
            r#"resource "vpc" "main" { cidr "10.1.0.0/16" }"#,
            schemas,
            2,
            false,
        )
        .await;

        assert!(result.is_success());
        assert_eq!(
            h.provider.log_entries(),
            vec!["create vpc.main", "delete vpc.main", "create vpc.main"]
        );
    }

    #[tokio::test]
    async fn test_destroy_in_reverse_dependency_order() {
        let h = harness();
        apply_kdl(
            &h,
            r#"
            resource "vpc" "main" { cidr "10.0.0.0/16" }
            resource "subnet" "public" { vpc (ref)"vpc.main.id" }
            "#,
            SchemaIndex::new(),
            2,
            false,
        )
        .await;

        // Empty declarations: everything in state is doomed
        let (result, snapshot) = apply_kdl(&h, "", SchemaIndex::new(), 2, false).await;

        assert!(result.is_success());
        assert!(snapshot.is_empty());
        let log = h.provider.log_entries();
        assert_eq!(
            &log[2..],
            &["delete subnet.public".to_string(), "delete vpc.main".to_string()]
        );
    }

    #[tokio::test]
    async fn test_terminal_failure_fails_fast() {
        let h = harness();
        h.provider.fail_terminal("a.first");

        let (result, snapshot) = apply_kdl(
            &h,
            r#"
            resource "a" "first" {}
            resource "b" "second" { upstream (ref)"a.first.id" }
            resource "c" "third" {}
            "#,
            SchemaIndex::new(),
            1,
            false,
        )
        .await;

        assert!(!result.is_success());
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].address, "a.first");
        // Nothing else was scheduled after the failure
        assert!(result.skipped.contains(&"b.second".to_string()));
        assert!(result.skipped.contains(&"c.third".to_string()));
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_retries_until_success() {
        let h = harness();
        h.provider.fail_transient("vpc.main", 2);

        let (result, snapshot) = apply_kdl(
            &h,
            r#"resource "vpc" "main" { cidr "10.0.0.0/16" }"#,
            SchemaIndex::new(),
            2,
            false,
        )
        .await;

        assert!(result.is_success());
        // Two transient failures, third attempt succeeds
        assert_eq!(
            h.provider.log_entries(),
            vec!["create vpc.main", "create vpc.main", "create vpc.main"]
        );
        assert!(snapshot.contains(&Address::new("vpc", "main")));
    }

    #[tokio::test]
    async fn test_transient_failures_exhaust_attempts() {
        let h = harness();
        h.provider.fail_transient("vpc.main", 10);

        let (result, snapshot) = apply_kdl(
            &h,
            r#"resource "vpc" "main" { cidr "10.0.0.0/16" }"#,
            SchemaIndex::new(),
            2,
            false,
        )
        .await;

        assert!(!result.is_success());
        assert_eq!(result.failed.len(), 1);
        assert_eq!(h.provider.log_entries().len(), 3);
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_applies_nothing() {
        let h = harness();
        let (result, snapshot) = apply_kdl(
            &h,
            r#"resource "vpc" "main" { cidr "10.0.0.0/16" }"#,
            SchemaIndex::new(),
            2,
            true,
        )
        .await;

        assert!(!result.is_success());
        assert!(result.failed.is_empty());
        assert_eq!(result.skipped, vec!["vpc.main".to_string()]);
        assert!(snapshot.is_empty());
        assert!(h.provider.log_entries().is_empty());
    }

    #[tokio::test]
    async fn test_outputs_reconciled_after_apply() {
        let h = harness();
        let (result, snapshot) = apply_kdl(
            &h,
            r#"
            resource "vpc" "main" { cidr "10.0.0.0/16" }
            output "vpc_id" { value (ref)"vpc.main.id" }
            output "environment" { value "production" }
            "#,
            SchemaIndex::new(),
            2,
            false,
        )
        .await;

        assert!(result.is_success());
        assert_eq!(
            snapshot.outputs.get("vpc_id"),
            Some(&serde_json::json!("mock-vpc.main"))
        );
        assert_eq!(
            snapshot.outputs.get("environment"),
            Some(&serde_json::json!("production"))
        );
    }

    #[tokio::test]
    async fn test_independent_chains_all_complete() {
        let h = harness();
        let (result, snapshot) = apply_kdl(
            &h,
            r#"
            resource "vpc" "a" {}
            resource "subnet" "a" { vpc (ref)"vpc.a.id" }
            resource "vpc" "b" {}
            resource "subnet" "b" { vpc (ref)"vpc.b.id" }
            "#,
            SchemaIndex::new(),
            4,
            false,
        )
        .await;

        assert!(result.is_success());
        assert_eq!(snapshot.resources.len(), 4);

        // Each chain stayed serialized regardless of interleaving
        let log = h.provider.log_entries();
        let pos = |entry: &str| log.iter().position(|l| l == entry).unwrap();
        assert!(pos("create vpc.a") < pos("create subnet.a"));
        assert!(pos("create vpc.b") < pos("create subnet.b"));
    }
}
