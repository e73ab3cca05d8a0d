//! Declaration file discovery
//!
//! Finds kumo declaration files from a conventional project layout:
//! `kumo.kdl` (or `.kumo/kumo.kdl`) at the root, plus `resources/**/*.kdl`
//! and `variables/**/*.kdl`.

use crate::error::{ManifestError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Files discovered for one project load.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredFiles {
    /// Root file (kumo.kdl)
    pub root: Option<PathBuf>,
    /// Resource declaration files (resources/**/*.kdl)
    pub resources: Vec<PathBuf>,
    /// Variable files (variables/**/*.kdl)
    pub variables: Vec<PathBuf>,
    /// Local override file (kumo.local.kdl)
    pub local_override: Option<PathBuf>,
    /// Environment file (.kumo/.env or .env)
    pub env_file: Option<PathBuf>,
}

/// Locate the project root.
///
/// Search order:
/// 1. KUMO_PROJECT_ROOT environment variable
/// 2. Walk up from the current directory looking for kumo.kdl or
///    .kumo/kumo.kdl
#[tracing::instrument]
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var("KUMO_PROJECT_ROOT") {
        let path = PathBuf::from(&root);
        debug!(env_root = %root, "Checking KUMO_PROJECT_ROOT");
        if path.join("kumo.kdl").exists() || path.join(".kumo/kumo.kdl").exists() {
            info!(project_root = %path.display(), "Found project root from environment variable");
            return Ok(path);
        }
    }

    let start_dir = std::env::current_dir()?;
    let mut current = start_dir.clone();
    debug!(start_dir = %start_dir.display(), "Searching for project root");

    loop {
        if current.join("kumo.kdl").exists() {
            info!(project_root = %current.display(), "Found project root (kumo.kdl)");
            return Ok(current);
        }
        if current.join(".kumo/kumo.kdl").exists() {
            info!(project_root = %current.display(), "Found project root (.kumo/kumo.kdl)");
            return Ok(current);
        }
        if !current.pop() {
            break;
        }
    }

    warn!(start_dir = %start_dir.display(), "Project root not found");
    Err(ManifestError::ProjectRootNotFound(start_dir))
}

/// Discover declaration files under a project root.
#[tracing::instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn discover_files(project_root: &Path) -> Result<DiscoveredFiles> {
    debug!("Starting file discovery");
    let mut discovered = DiscoveredFiles::default();

    let root_file = project_root.join("kumo.kdl");
    let hidden_root_file = project_root.join(".kumo/kumo.kdl");
    if root_file.exists() {
        debug!(file = %root_file.display(), "Found root file");
        discovered.root = Some(root_file);
    } else if hidden_root_file.exists() {
        debug!(file = %hidden_root_file.display(), "Found root file in .kumo/");
        discovered.root = Some(hidden_root_file);
    }

    let resources_dir = project_root.join("resources");
    if resources_dir.is_dir() {
        discovered.resources = discover_kdl_files(&resources_dir)?;
        info!(
            resource_file_count = discovered.resources.len(),
            "Discovered resource files"
        );
    }

    let variables_dir = project_root.join("variables");
    if variables_dir.is_dir() {
        discovered.variables = discover_kdl_files(&variables_dir)?;
        info!(
            variable_file_count = discovered.variables.len(),
            "Discovered variable files"
        );
    }

    let local_override = project_root.join("kumo.local.kdl");
    let hidden_local_override = project_root.join(".kumo/kumo.local.kdl");
    if local_override.exists() {
        discovered.local_override = Some(local_override);
    } else if hidden_local_override.exists() {
        discovered.local_override = Some(hidden_local_override);
    }

    let hidden_env = project_root.join(".kumo/.env");
    let plain_env = project_root.join(".env");
    if hidden_env.exists() {
        discovered.env_file = Some(hidden_env);
    } else if plain_env.exists() {
        discovered.env_file = Some(plain_env);
    }

    Ok(discovered)
}

/// Recursively collect *.kdl files under a directory, sorted for a stable
/// load order.
fn discover_kdl_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_kdl_files(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_kdl_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| ManifestError::IoError {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })? {
        let entry = entry.map_err(|e| ManifestError::IoError {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_kdl_files(&path, files)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("kdl") {
            files.push(path);
        }
    }
    Ok(())
}
