use colored::Colorize;
use kumo_core::DependencyGraph;

pub fn handle(project_root: &std::path::Path, dot: bool) -> anyhow::Result<()> {
    let manifest = kumo_core::load_project_from_root(project_root)?;
    manifest.validate()?;
    let graph = DependencyGraph::from_manifest(&manifest)?;

    if dot {
        println!("digraph {} {{", sanitize(&manifest.name));
        for address in graph.addresses() {
            println!("  \"{}\";", address);
        }
        for (from, to) in graph.edges() {
            println!("  \"{}\" -> \"{}\";", from, to);
        }
        println!("}}");
        return Ok(());
    }

    let order = graph.creation_order()?;
    println!(
        "{}",
        format!("Creation order ({} resources):", order.len()).bold()
    );
    for (index, address) in order.iter().enumerate() {
        let dependencies = graph.dependencies_of(address);
        if dependencies.is_empty() {
            println!("  {}. {}", index + 1, address.to_string().cyan());
        } else {
            let after: Vec<String> = dependencies.iter().map(ToString::to_string).collect();
            println!(
                "  {}. {} (after {})",
                index + 1,
                address.to_string().cyan(),
                after.join(", ")
            );
        }
    }

    Ok(())
}

/// Graphviz identifiers cannot contain dashes or dots.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}
