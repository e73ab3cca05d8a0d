//! KDL parser
//!
//! Parses kumo declaration files. Each node type has its own module.

mod output;
mod provider;
mod resource;
mod value;

use output::parse_output;
use provider::parse_provider;
use resource::parse_resource;

pub use resource::DEFAULT_PROVIDER;

use crate::error::{ManifestError, Result};
use crate::model::Manifest;
use kdl::KdlDocument;
use std::fs;
use std::path::Path;

/// Parse a KDL file into a Manifest.
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<Manifest> {
    let content = fs::read_to_string(path.as_ref())?;
    let name = path
        .as_ref()
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_kdl_string(&content, name)
}

/// Parse a KDL string into a Manifest.
pub fn parse_kdl_string(content: &str, default_name: String) -> Result<Manifest> {
    let doc: KdlDocument = content.parse()?;

    let mut manifest = Manifest {
        name: default_name,
        ..Default::default()
    };

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                if let Some(project_name) =
                    node.entries().first().and_then(|e| e.value().as_string())
                {
                    manifest.name = project_name.to_string();
                }
            }
            "resource" => {
                let resource = parse_resource(node)?;
                manifest.add_resource(resource)?;
            }
            "output" => {
                let output = parse_output(node)?;
                if manifest.outputs.contains_key(&output.name) {
                    return Err(ManifestError::DuplicateOutput(output.name));
                }
                manifest.outputs.insert(output.name.clone(), output);
            }
            "provider" => {
                let (provider_name, provider) = parse_provider(node)?;
                manifest.providers.insert(provider_name, provider);
            }
            "variables" => {
                if let Some(vars) = node.children() {
                    for var in vars.nodes() {
                        let key = var.name().value().to_string();
                        let value = var
                            .entries()
                            .first()
                            .and_then(|e| e.value().as_string())
                            .unwrap_or("")
                            .to_string();
                        manifest.variables.insert(key, value);
                    }
                }
            }
            _ => {
                // Unknown nodes are skipped so declaration files stay
                // forward compatible
            }
        }
    }

    Ok(manifest)
}
