use colored::Colorize;
use kumo_core::Manifest;
use kumo_engine::{ActionType, Plan, ProviderRegistry};
use kumo_provider_local::LocalProvider;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolve the project root from the --project flag or by discovery.
pub fn resolve_project_root(project: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match project {
        Some(path) => {
            if path.join("kumo.kdl").exists() || path.join(".kumo/kumo.kdl").exists() {
                Ok(path)
            } else {
                Err(anyhow::anyhow!(
                    "no kumo.kdl found under {}",
                    path.display()
                ))
            }
        }
        None => Ok(kumo_core::find_project_root()?),
    }
}

/// Build the provider registry from the manifest's provider blocks.
///
/// With no blocks declared, the local provider is registered with its
/// defaults so small projects work out of the box.
pub fn build_registry(
    project_root: &Path,
    manifest: &Manifest,
) -> anyhow::Result<Arc<ProviderRegistry>> {
    let mut registry = ProviderRegistry::new();

    for (name, config) in &manifest.providers {
        match name.as_str() {
            "local" => {
                registry.register(Arc::new(LocalProvider::from_config(project_root, config)?));
            }
            other => {
                return Err(anyhow::anyhow!(
                    "unknown provider '{}' (only 'local' is built in)",
                    other
                ));
            }
        }
    }

    if !registry.contains(kumo_core::DEFAULT_PROVIDER) {
        registry.register(Arc::new(LocalProvider::new(
            project_root.join(".kumo/objects"),
        )));
    }

    Ok(Arc::new(registry))
}

/// Print a plan in per-action lines plus a summary.
pub fn print_plan(plan: &Plan) {
    if !plan.has_changes {
        println!(
            "{}",
            "No changes. Infrastructure matches the declarations.".green()
        );
        return;
    }

    println!();
    for action in &plan.actions {
        let reason = if action.changed.is_empty() {
            String::new()
        } else {
            format!(" ({})", action.changed.join(", "))
        };
        let line = match action.action_type {
            ActionType::Create => format!("  + {}", action.address).green(),
            ActionType::Update => format!("  ~ {}{}", action.address, reason).yellow(),
            ActionType::Replace => format!("  ± {}{}", action.address, reason).red(),
            ActionType::Delete => format!("  - {}", action.address).red(),
            ActionType::NoOp => continue,
        };
        println!("{}", line);
    }
    println!();
    println!("{}", format!("Plan: {}", plan.summary()).bold());
}
