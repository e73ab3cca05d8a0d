//! Provider block configuration
//!
//! A provider block names an integration and hands it an opaque bag of
//! settings. Resource-specific semantics live behind the integration, not
//! here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for a provider integration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name (e.g. "local").
    pub name: String,

    /// Provider-specific settings.
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: BTreeMap::new(),
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }
}
