//! Provider trait definition
//!
//! A provider integration owns all resource-type semantics. The engine only
//! ever talks to it through this interface: ask for the per-type schema,
//! then create, update or delete one resource at a time.

use crate::error::{EngineError, ProviderError, Result};
use crate::state::ResourceRecord;
use async_trait::async_trait;
use kumo_core::Address;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Provider abstraction trait
///
/// Implementations must be idempotent per node: re-running a create for a
/// resource that already exists, or a delete for one that is gone, is not
/// an error.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name as referenced by declarations (e.g. "local").
    fn name(&self) -> &str;

    /// Schema for a resource type. Unknown types get an empty schema.
    fn schema(&self, resource_type: &str) -> ResourceSchema;

    /// Create a new resource and return its assigned identity and
    /// finalized attributes.
    async fn create(
        &self,
        request: &ApplyRequest,
    ) -> std::result::Result<AppliedResource, ProviderError>;

    /// Update an existing resource in place.
    async fn update(
        &self,
        request: &ApplyRequest,
        prior: &ResourceRecord,
    ) -> std::result::Result<AppliedResource, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, prior: &ResourceRecord) -> std::result::Result<(), ProviderError>;
}

/// Per-resource-type schema exposed by a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSchema {
    /// Attributes that cannot be changed in place; a change forces a
    /// replace.
    pub force_new: BTreeSet<String>,
}

impl ResourceSchema {
    pub fn force_new<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            force_new: attributes.into_iter().map(Into::into).collect(),
        }
    }
}

/// A fully resolved apply request for one resource: every reference has
/// been replaced by the finalized value of its target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyRequest {
    pub address: Address,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// What a provider reports back after a successful create or update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedResource {
    /// Provider-assigned identifier.
    pub id: String,

    /// Finalized attributes, including computed ones.
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (first try included).
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: std::time::Duration,

    /// Maximum delay between retries
    pub max_delay: std::time::Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: std::time::Duration::from_secs(1),
            max_delay: std::time::Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// A config that never retries. Keeps tests fast.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn next_delay(&self, current: std::time::Duration) -> std::time::Duration {
        current.mul_f64(self.backoff_multiplier).min(self.max_delay)
    }
}

/// Registry of provider integrations, keyed by name.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::ProviderNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Schema lookup across all registered providers, keyed by provider
    /// name. The differ consumes this.
    pub fn schema_for(&self, provider: &str, resource_type: &str) -> ResourceSchema {
        self.providers
            .get(provider)
            .map(|p| p.schema(resource_type))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_backoff_is_capped() {
        let retry = RetryConfig {
            max_attempts: 5,
            initial_delay: std::time::Duration::from_secs(10),
            max_delay: std::time::Duration::from_secs(15),
            backoff_multiplier: 2.0,
        };
        let next = retry.next_delay(std::time::Duration::from_secs(10));
        assert_eq!(next, std::time::Duration::from_secs(15));
    }

    #[test]
    fn test_registry_unknown_provider() {
        let registry = ProviderRegistry::new();
        assert!(matches!(
            registry.get("sakura-cloud"),
            Err(EngineError::ProviderNotFound(_))
        ));
    }
}
