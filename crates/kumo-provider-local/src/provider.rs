//! Local filesystem provider
//!
//! Materializes resources as JSON documents under an object root, one file
//! per resource at `<root>/<type>/<name>.json`. It carries no cloud
//! semantics; it exists so the reconciler can be exercised end to end and
//! so small projects have somewhere concrete to land.

use crate::error::{LocalProviderError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kumo_core::{Address, ProviderConfig};
use kumo_engine::{
    AppliedResource, ApplyRequest, Provider, ProviderError, ResourceRecord, ResourceSchema,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Default object root, relative to the project directory.
const DEFAULT_ROOT: &str = ".kumo/objects";

/// Local filesystem provider.
pub struct LocalProvider {
    base_dir: PathBuf,
    schemas: HashMap<String, ResourceSchema>,
}

/// On-disk document for one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObjectDocument {
    id: String,
    resource_type: String,
    name: String,
    attributes: BTreeMap<String, serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LocalProvider {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            schemas: HashMap::new(),
        }
    }

    /// Build a provider from its declaration block.
    ///
    /// ```kdl
    /// provider "local" {
    ///     root ".kumo/objects"
    ///     immutable {
    ///         vpc "cidr"
    ///         subnet "cidr" "vpc"
    ///     }
    /// }
    /// ```
    pub fn from_config(project_root: &Path, config: &ProviderConfig) -> Result<Self> {
        let root = config.get_str("root").unwrap_or(DEFAULT_ROOT);
        let base_dir = project_root.join(root);
        if base_dir.exists() && !base_dir.is_dir() {
            return Err(LocalProviderError::InvalidRoot(
                base_dir.display().to_string(),
            ));
        }

        let mut schemas = HashMap::new();
        if let Some(immutable) = config.config.get("immutable") {
            let entries = immutable.as_object().ok_or_else(|| {
                LocalProviderError::InvalidImmutable {
                    resource_type: "immutable".to_string(),
                }
            })?;
            for (resource_type, attrs) in entries {
                let force_new: Vec<String> = match attrs {
                    serde_json::Value::String(s) => vec![s.clone()],
                    serde_json::Value::Array(values) => values
                        .iter()
                        .map(|v| {
                            v.as_str().map(str::to_string).ok_or_else(|| {
                                LocalProviderError::InvalidImmutable {
                                    resource_type: resource_type.clone(),
                                }
                            })
                        })
                        .collect::<Result<_>>()?,
                    _ => {
                        return Err(LocalProviderError::InvalidImmutable {
                            resource_type: resource_type.clone(),
                        });
                    }
                };
                schemas.insert(resource_type.clone(), ResourceSchema::force_new(force_new));
            }
        }

        Ok(Self { base_dir, schemas })
    }

    fn object_path(&self, address: &Address) -> PathBuf {
        self.base_dir
            .join(&address.resource_type)
            .join(format!("{}.json", address.name))
    }

    async fn read_document(&self, address: &Address) -> Result<Option<ObjectDocument>> {
        let path = self.object_path(address);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await?;
        let document = serde_json::from_str(&content).map_err(|e| {
            LocalProviderError::CorruptDocument {
                path: path.display().to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Some(document))
    }

    async fn write_document(&self, address: &Address, document: &ObjectDocument) -> Result<()> {
        let path = self.object_path(address);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(document)?;
        fs::write(&path, content).await?;
        debug!(path = %path.display(), "Wrote object document");
        Ok(())
    }

    fn assign_id(address: &Address) -> String {
        // Opaque but stable-looking: address hash plus creation time
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        address.hash(&mut hasher);
        Utc::now().timestamp_millis().hash(&mut hasher);
        format!("lcl-{:012x}", hasher.finish() & 0xffff_ffff_ffff)
    }

    fn finalized(
        document: &ObjectDocument,
    ) -> (String, BTreeMap<String, serde_json::Value>) {
        let mut attributes = document.attributes.clone();
        attributes.insert("id".to_string(), serde_json::json!(document.id.clone()));
        (document.id.clone(), attributes)
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn schema(&self, resource_type: &str) -> ResourceSchema {
        self.schemas.get(resource_type).cloned().unwrap_or_default()
    }

    async fn create(
        &self,
        request: &ApplyRequest,
    ) -> std::result::Result<AppliedResource, ProviderError> {
        // Idempotent: an existing document keeps its identity
        let existing = self
            .read_document(&request.address)
            .await
            .map_err(terminal)?;
        let now = Utc::now();
        let document = match existing {
            Some(mut document) => {
                document.attributes = request.attributes.clone();
                document.updated_at = now;
                document
            }
            None => ObjectDocument {
                id: Self::assign_id(&request.address),
                resource_type: request.address.resource_type.clone(),
                name: request.address.name.clone(),
                attributes: request.attributes.clone(),
                created_at: now,
                updated_at: now,
            },
        };
        self.write_document(&request.address, &document)
            .await
            .map_err(terminal)?;

        let (id, attributes) = Self::finalized(&document);
        Ok(AppliedResource { id, attributes })
    }

    async fn update(
        &self,
        request: &ApplyRequest,
        prior: &ResourceRecord,
    ) -> std::result::Result<AppliedResource, ProviderError> {
        let existing = self
            .read_document(&request.address)
            .await
            .map_err(terminal)?;
        let now = Utc::now();
        let document = match existing {
            Some(mut document) => {
                document.attributes = request.attributes.clone();
                document.updated_at = now;
                document
            }
            // Document lost out from under us; recreate under the recorded id
            None => ObjectDocument {
                id: prior.id.clone(),
                resource_type: request.address.resource_type.clone(),
                name: request.address.name.clone(),
                attributes: request.attributes.clone(),
                created_at: now,
                updated_at: now,
            },
        };
        self.write_document(&request.address, &document)
            .await
            .map_err(terminal)?;

        let (id, attributes) = Self::finalized(&document);
        Ok(AppliedResource { id, attributes })
    }

    async fn delete(&self, prior: &ResourceRecord) -> std::result::Result<(), ProviderError> {
        let path = self.object_path(&prior.address);
        if path.exists() {
            fs::remove_file(&path).await.map_err(ProviderError::Io)?;
            debug!(path = %path.display(), "Removed object document");
        }
        // Already gone counts as deleted
        Ok(())
    }
}

fn terminal(error: LocalProviderError) -> ProviderError {
    ProviderError::Terminal(error.to_string())
}
