//! State snapshot management
//!
//! The `.kumo/state.json` file records the last-applied attributes and
//! provider-assigned identifiers of every resource. It is read by the
//! differ and mutated only by the executor, one successful node apply at a
//! time, so an interrupted run leaves exactly the completed nodes recorded.

use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use kumo_core::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".kumo";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Persisted reconciliation state for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// State file version
    pub version: u32,

    /// Monotonic revision counter, bumped on every save.
    pub serial: u64,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Records keyed by rendered address (`type.name`).
    pub resources: BTreeMap<String, ResourceRecord>,

    /// Reconciled output values.
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            serial: 0,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &Address) -> Option<&ResourceRecord> {
        self.resources.get(&address.to_string())
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.resources.contains_key(&address.to_string())
    }

    pub fn set_resource(&mut self, record: ResourceRecord) {
        self.resources.insert(record.address.to_string(), record);
        self.updated_at = Utc::now();
    }

    pub fn remove_resource(&mut self, address: &Address) -> Option<ResourceRecord> {
        let removed = self.resources.remove(&address.to_string());
        if removed.is_some() {
            self.updated_at = Utc::now();
        }
        removed
    }

    /// Recorded addresses in stable order.
    pub fn addresses(&self) -> Vec<Address> {
        self.resources.values().map(|r| r.address.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Last-applied state of a single resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub address: Address,

    /// Provider-assigned resource ID
    pub id: String,

    /// Provider integration managing this resource.
    pub provider: String,

    /// Finalized attributes, including provider-computed ones.
    pub attributes: BTreeMap<String, Value>,

    /// Addresses this resource depended on when applied. Used to order
    /// deletions after the declarations are gone.
    #[serde(default)]
    pub depends_on: Vec<Address>,

    /// When the resource was created
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    pub fn new(address: Address, id: impl Into<String>, provider: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            address,
            id: id.into(),
            provider: provider.into(),
            attributes: BTreeMap::new(),
            depends_on: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_depends_on(mut self, depends_on: Vec<Address>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Look up an attribute by dotted path (`versioning.enabled`).
    pub fn attribute_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.attributes.get(first)?;
        for segment in segments {
            current = current.get(segment)?;
        }
        Some(current)
    }
}

/// State manager for reading/writing the snapshot.
pub struct StateManager {
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the current snapshot, or an empty one when none exists yet.
    pub async fn load(&self) -> Result<StateSnapshot> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty snapshot");
            return Ok(StateSnapshot::new());
        }

        let content = fs::read_to_string(&path).await?;
        let snapshot: StateSnapshot = serde_json::from_str(&content)?;

        if snapshot.version > STATE_VERSION {
            return Err(EngineError::State(format!(
                "state file version {} is newer than supported version {}",
                snapshot.version, STATE_VERSION
            )));
        }

        tracing::debug!(
            resources = snapshot.resources.len(),
            serial = snapshot.serial,
            "Loaded state snapshot"
        );
        Ok(snapshot)
    }

    /// Save the snapshot, bumping its serial. The previous file is kept as
    /// a backup.
    pub async fn save(&self, snapshot: &mut StateSnapshot) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
        }

        snapshot.serial += 1;
        snapshot.updated_at = Utc::now();
        let content = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, content).await?;

        tracing::debug!(
            resources = snapshot.resources.len(),
            serial = snapshot.serial,
            "Saved state snapshot"
        );
        Ok(())
    }

    /// Acquire the run lock. Stale locks (older than 1 hour) are broken.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(EngineError::Lock(format!(
                    "state is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the state lock.
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            // Synchronous cleanup in drop - not ideal but necessary
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut snapshot = StateSnapshot::new();
        snapshot.set_resource(
            ResourceRecord::new(Address::new("vpc", "main"), "lcl-1a2b", "local")
                .with_attribute("cidr", serde_json::json!("10.0.0.0/16")),
        );

        manager.save(&mut snapshot).await.unwrap();
        assert_eq!(snapshot.serial, 1);

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.resources.len(), 1);
        assert!(loaded.contains(&Address::new("vpc", "main")));
        assert_eq!(loaded.serial, 1);
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let snapshot = manager.load().await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.serial, 0);
    }

    #[tokio::test]
    async fn test_save_keeps_backup() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut snapshot = StateSnapshot::new();
        manager.save(&mut snapshot).await.unwrap();
        manager.save(&mut snapshot).await.unwrap();

        assert!(temp_dir.path().join(".kumo/state.json").exists());
        assert!(temp_dir.path().join(".kumo/state.json.backup").exists());
    }

    #[tokio::test]
    async fn test_lock_blocks_second_acquire() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(
            manager.acquire_lock().await,
            Err(EngineError::Lock(_))
        ));
        lock.release().await.unwrap();

        // Released lock can be re-acquired
        let lock = manager.acquire_lock().await.unwrap();
        lock.release().await.unwrap();
    }

    #[test]
    fn test_attribute_path_lookup() {
        let record = ResourceRecord::new(Address::new("bucket", "assets"), "lcl-1", "local")
            .with_attribute(
                "versioning",
                serde_json::json!({"enabled": true, "max_versions": 5}),
            );

        assert_eq!(
            record.attribute_path("versioning.enabled"),
            Some(&serde_json::json!(true))
        );
        assert_eq!(record.attribute_path("versioning.missing"), None);
        assert_eq!(record.attribute_path("absent"), None);
    }
}
