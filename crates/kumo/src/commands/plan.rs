use crate::utils;
use colored::Colorize;
use kumo_core::DependencyGraph;
use kumo_engine::{Differ, SchemaIndex, StateManager};

pub async fn handle(project_root: &std::path::Path) -> anyhow::Result<()> {
    let manifest = kumo_core::load_project_from_root(project_root)?;
    manifest.validate()?;
    let graph = DependencyGraph::from_manifest(&manifest)?;

    let registry = utils::build_registry(project_root, &manifest)?;
    let schemas = SchemaIndex::for_manifest(&manifest, |p, t| registry.schema_for(p, t));

    let state = StateManager::new(project_root);
    let snapshot = state.load().await?;

    println!(
        "{}",
        format!(
            "Planning {} ({} declared, {} recorded)...",
            manifest.name,
            manifest.resources.len(),
            snapshot.resources.len()
        )
        .blue()
    );

    let plan = Differ::new(schemas).plan(&manifest, &graph, &snapshot)?;
    utils::print_plan(&plan);

    Ok(())
}
