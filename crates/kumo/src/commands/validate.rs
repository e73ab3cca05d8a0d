use colored::Colorize;
use kumo_core::DependencyGraph;

pub async fn handle(project_root: &std::path::Path) -> anyhow::Result<()> {
    println!("{}", "Validating declarations...".blue());
    println!(
        "Project root: {}",
        project_root.display().to_string().cyan()
    );

    let manifest = match kumo_core::load_project_from_root(project_root) {
        Ok(manifest) => manifest,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ declaration error".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    // References, providers, outputs, then graph acyclicity
    let checked = manifest
        .validate()
        .and_then(|_| DependencyGraph::from_manifest(&manifest)?.creation_order());
    if let Err(e) = checked {
        eprintln!();
        eprintln!("{}", "✗ invalid declarations".red().bold());
        eprintln!("  {}", e);
        std::process::exit(1);
    }

    println!("{}", "✓ declarations are valid".green().bold());
    println!();
    println!("Summary:");
    println!("  project: {}", manifest.name.cyan());
    println!("  resources: {}", manifest.resources.len());
    for node in manifest.iter_resources() {
        println!("    - {} ({})", node.address.to_string().cyan(), node.provider);
    }
    if !manifest.outputs.is_empty() {
        println!("  outputs: {}", manifest.outputs.len());
        for name in manifest.outputs.keys() {
            println!("    - {}", name.cyan());
        }
    }
    if !manifest.providers.is_empty() {
        println!("  providers: {}", manifest.providers.len());
        for name in manifest.providers.keys() {
            println!("    - {}", name.cyan());
        }
    }

    Ok(())
}
