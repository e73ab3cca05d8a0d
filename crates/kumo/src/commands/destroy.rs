use crate::utils;
use colored::Colorize;
use kumo_core::{DependencyGraph, Manifest};
use kumo_engine::{
    Differ, Executor, ExecutorOptions, RetryConfig, SchemaIndex, StateManager,
};
use tokio::sync::watch;

pub async fn handle(
    project_root: &std::path::Path,
    yes: bool,
    parallelism: usize,
) -> anyhow::Result<()> {
    let state = StateManager::new(project_root);
    let snapshot = state.load().await?;

    if snapshot.is_empty() {
        println!("{}", "State is empty, nothing to destroy.".green());
        return Ok(());
    }

    // Diffing an empty manifest marks every recorded resource for deletion,
    // ordered dependents first
    let manifest = Manifest::default();
    let graph = DependencyGraph::from_manifest(&manifest)?;
    let plan = Differ::new(SchemaIndex::new()).plan(&manifest, &graph, &snapshot)?;
    utils::print_plan(&plan);

    if !yes {
        println!();
        println!(
            "{}",
            "Warning: this will destroy everything recorded in state.".yellow()
        );
        println!("Run again with --yes to destroy");
        return Ok(());
    }

    // Provider blocks may still exist in the declarations; fall back to the
    // default registry when they are gone
    let registry = match kumo_core::load_project_from_root(project_root) {
        Ok(declared) => utils::build_registry(project_root, &declared)?,
        Err(_) => utils::build_registry(project_root, &manifest)?,
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    println!();
    println!("{}", "Destroying...".red().bold());

    let executor = Executor::new(
        registry,
        ExecutorOptions {
            parallelism,
            retry: RetryConfig::default(),
        },
    );
    let result = executor
        .apply(&manifest, &graph, &plan, &state, cancel_rx)
        .await?;

    println!();
    for action in &result.succeeded {
        println!("  {} {} destroyed", "✓".green(), action.address.cyan());
    }
    for action in &result.failed {
        eprintln!(
            "  {} {}: {}",
            "✗".red(),
            action.address.cyan(),
            action.error.as_deref().unwrap_or("unknown error")
        );
    }
    for address in &result.skipped {
        println!("  - {} (skipped)", address);
    }

    if !result.is_success() {
        eprintln!();
        eprintln!("{}", "✗ destroy finished with errors".red().bold());
        std::process::exit(1);
    }

    println!();
    println!(
        "{}",
        format!("✓ destroy complete ({} removed)", result.succeeded.len())
            .green()
            .bold()
    );
    Ok(())
}
