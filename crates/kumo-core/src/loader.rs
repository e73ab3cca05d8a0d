//! Project loader
//!
//! Ties discovery, template expansion and parsing together.

use crate::discovery::{DiscoveredFiles, discover_files, find_project_root};
use crate::error::{ManifestError, Result};
use crate::model::Manifest;
use crate::parser::parse_kdl_string;
use crate::template::{TemplateProcessor, Variables, extract_variables};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Estimated bytes per declaration file, for buffer preallocation.
const ESTIMATED_BYTES_PER_FILE: usize = 500;

/// Load the project containing the current directory.
///
/// Steps:
/// 1. Locate the project root
/// 2. Discover declaration files
/// 3. Collect variables
/// 4. Expand templates
/// 5. Parse KDL into a Manifest
#[instrument]
pub fn load_project() -> Result<Manifest> {
    info!("Starting project load");
    let project_root = find_project_root()?;
    load_project_from_root(&project_root)
}

/// Load a project from an explicit root directory.
#[instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn load_project_from_root(project_root: &Path) -> Result<Manifest> {
    debug!("Step 1: Discovering files");
    let discovered = discover_files(project_root)?;

    debug!("Step 2: Preparing template processor");
    let mut processor = prepare_template_processor(&discovered, project_root)?;

    debug!("Step 3: Expanding templates");
    let expanded = expand_all_files(&discovered, &mut processor)?;
    info!(content_size = expanded.len(), "Template expansion complete");

    debug!("Step 4: Parsing KDL");
    let name = project_root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    let manifest = parse_kdl_string(&expanded, name)?;
    info!(
        resources = manifest.resources.len(),
        outputs = manifest.outputs.len(),
        "Project loaded successfully"
    );

    Ok(manifest)
}

fn prepare_template_processor(
    discovered: &DiscoveredFiles,
    project_root: &Path,
) -> Result<TemplateProcessor> {
    let mut processor = TemplateProcessor::new();
    let mut all_variables = Variables::new();

    // Built-in variables
    processor.add_variable(
        "PROJECT_ROOT",
        serde_json::Value::String(project_root.to_string_lossy().to_string()),
    );

    // 1. Root file variables (kumo.kdl)
    if let Some(root_file) = &discovered.root {
        let content = std::fs::read_to_string(root_file).map_err(|e| ManifestError::IoError {
            path: root_file.clone(),
            message: e.to_string(),
        })?;
        all_variables.extend(extract_variables(&content)?);
    }

    // 2. variables/**/*.kdl
    for var_file in &discovered.variables {
        let content = std::fs::read_to_string(var_file).map_err(|e| ManifestError::IoError {
            path: var_file.clone(),
            message: e.to_string(),
        })?;
        all_variables.extend(extract_variables(&content)?);
    }

    // 3. .env file
    if let Some(env_file) = &discovered.env_file {
        processor.add_env_file_variables(env_file)?;
    }

    // 4. KUMO_* environment variables (override .env)
    processor.add_env_variables();

    // 5. Declared variables win over everything
    debug!(vars = ?all_variables, "Adding collected variables to processor");
    processor.add_variables(all_variables);

    Ok(processor)
}

fn expand_all_files(
    discovered: &DiscoveredFiles,
    processor: &mut TemplateProcessor,
) -> Result<String> {
    let file_count = discovered.resources.len()
        + usize::from(discovered.root.is_some())
        + usize::from(discovered.local_override.is_some());
    let mut expanded = String::with_capacity(file_count * ESTIMATED_BYTES_PER_FILE);

    // 1. kumo.kdl
    if let Some(root_file) = &discovered.root {
        debug!(file = %root_file.display(), "Rendering root file");
        expanded.push_str(&processor.render_file(root_file)?);
        expanded.push_str("\n\n");
    }

    // 2. resources/**/*.kdl
    for resource_file in &discovered.resources {
        debug!(file = %resource_file.display(), "Rendering resource file");
        expanded.push_str(&processor.render_file(resource_file)?);
        expanded.push_str("\n\n");
    }

    // 3. kumo.local.kdl
    if let Some(local_file) = &discovered.local_override {
        debug!(file = %local_file.display(), "Rendering local override file");
        expanded.push_str(&processor.render_file(local_file)?);
        expanded.push_str("\n\n");
    }

    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Address;
    use std::fs;

    fn create_test_project(base: &Path) -> Result<()> {
        fs::write(
            base.join("kumo.kdl"),
            r#"
project "acme-platform"

variables {
    cidr_base "10.0"
}

provider "local" {
    root ".kumo/objects"
}
"#,
        )?;

        fs::create_dir_all(base.join("resources"))?;
        fs::write(
            base.join("resources/network.kdl"),
            r#"
resource "vpc" "main" {
    cidr "{{ cidr_base }}.0.0/16"
}

resource "subnet" "public" {
    vpc (ref)"vpc.main.id"
    cidr "{{ cidr_base }}.1.0/24"
}
"#,
        )?;

        fs::write(
            base.join("resources/outputs.kdl"),
            r#"
output "vpc_id" {
    value (ref)"vpc.main.id"
}
"#,
        )?;

        Ok(())
    }

    #[test]
    fn test_load_project_basic() -> Result<()> {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_root = temp_dir.path();
        create_test_project(project_root)?;

        let manifest = load_project_from_root(project_root)?;

        assert_eq!(manifest.name, "acme-platform");
        assert_eq!(manifest.resources.len(), 2);
        assert_eq!(manifest.outputs.len(), 1);

        // Template expansion applied
        let vpc = manifest.get(&Address::new("vpc", "main")).unwrap();
        assert_eq!(
            vpc.attributes.get("cidr").unwrap().as_literal(),
            Some(&serde_json::json!("10.0.0.0/16"))
        );

        // References parsed
        let subnet = manifest.get(&Address::new("subnet", "public")).unwrap();
        assert!(subnet.attributes.get("vpc").unwrap().as_reference().is_some());

        manifest.validate()?;
        Ok(())
    }

    #[test]
    fn test_load_project_local_override_wins() -> Result<()> {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_root = temp_dir.path();
        fs::write(project_root.join("kumo.kdl"), r#"project "base""#)?;
        fs::write(project_root.join("kumo.local.kdl"), r#"project "local""#)?;

        let manifest = load_project_from_root(project_root)?;
        // The override file is rendered last, so its project node wins
        assert_eq!(manifest.name, "local");
        Ok(())
    }

    #[test]
    fn test_load_project_with_env_file() -> Result<()> {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_root = temp_dir.path();
        fs::create_dir_all(project_root.join(".kumo"))?;
        fs::write(project_root.join(".kumo/.env"), "ZONE=tk1a\n")?;
        fs::write(
            project_root.join(".kumo/kumo.kdl"),
            r#"
resource "vpc" "main" {
    zone "{{ ZONE }}"
}
"#,
        )?;

        let manifest = load_project_from_root(project_root)?;
        let vpc = manifest.get(&Address::new("vpc", "main")).unwrap();
        assert_eq!(
            vpc.attributes.get("zone").unwrap().as_literal(),
            Some(&serde_json::json!("tk1a"))
        );
        Ok(())
    }

    #[test]
    fn test_load_project_declared_variables_override_env_file() -> Result<()> {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_root = temp_dir.path();
        fs::write(project_root.join(".env"), "REGION=from-env\n")?;
        fs::write(
            project_root.join("kumo.kdl"),
            r#"
variables {
    REGION "from-variables"
}

resource "vpc" "main" {
    region "{{ REGION }}"
}
"#,
        )?;

        let manifest = load_project_from_root(project_root)?;
        let vpc = manifest.get(&Address::new("vpc", "main")).unwrap();
        assert_eq!(
            vpc.attributes.get("region").unwrap().as_literal(),
            Some(&serde_json::json!("from-variables"))
        );
        Ok(())
    }
}
