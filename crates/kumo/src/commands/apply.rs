use crate::utils;
use colored::Colorize;
use kumo_core::DependencyGraph;
use kumo_engine::{
    Differ, Executor, ExecutorOptions, RetryConfig, SchemaIndex, StateManager, resolve_outputs,
};
use tokio::sync::watch;

pub async fn handle(
    project_root: &std::path::Path,
    yes: bool,
    parallelism: usize,
) -> anyhow::Result<()> {
    let manifest = kumo_core::load_project_from_root(project_root)?;
    manifest.validate()?;
    let graph = DependencyGraph::from_manifest(&manifest)?;

    let registry = utils::build_registry(project_root, &manifest)?;
    let schemas = SchemaIndex::for_manifest(&manifest, |p, t| registry.schema_for(p, t));

    let state = StateManager::new(project_root);
    let mut snapshot = state.load().await?;

    let plan = Differ::new(schemas).plan(&manifest, &graph, &snapshot)?;
    utils::print_plan(&plan);

    if !plan.has_changes {
        // Outputs may still have been added or removed
        let outputs = resolve_outputs(&manifest, &snapshot)?;
        if outputs != snapshot.outputs {
            snapshot.outputs = outputs;
            state.save(&mut snapshot).await?;
            println!("{}", "Outputs updated.".green());
        }
        return Ok(());
    }

    if !yes {
        println!();
        println!(
            "{}",
            "Warning: this will change recorded infrastructure.".yellow()
        );
        println!("Run again with --yes to apply these changes");
        return Ok(());
    }

    // Ctrl-C stops scheduling new resources; in-flight ones finish
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    println!();
    println!("{}", "Applying...".blue().bold());

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
        println!("  {} {} {}", "✓".green(), action.address.cyan(), action.message);
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
        eprintln!("{}", "✗ apply finished with errors".red().bold());
        std::process::exit(1);
    }

    println!();
    println!(
        "{}",
        format!(
            "✓ apply complete ({} changed, {}ms)",
            result.succeeded.len(),
            result.duration_ms
        )
        .green()
        .bold()
    );

    let snapshot = state.load().await?;
    if !snapshot.outputs.is_empty() {
        println!();
        println!("{}", "Outputs:".bold());
        for (name, value) in &snapshot.outputs {
            println!("  {} = {}", name.cyan(), value);
        }
    }

    Ok(())
}
