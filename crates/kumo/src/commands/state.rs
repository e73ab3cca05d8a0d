use colored::Colorize;
use kumo_core::Address;
use kumo_engine::StateManager;

pub async fn handle_list(project_root: &std::path::Path) -> anyhow::Result<()> {
    let snapshot = StateManager::new(project_root).load().await?;

    if snapshot.is_empty() {
        println!("{}", "No resources recorded.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Recorded resources ({}):", snapshot.resources.len()).bold()
    );
    for record in snapshot.resources.values() {
        println!(
            "  • {} ({}, id: {})",
            record.address.to_string().cyan(),
            record.provider,
            record.id
        );
    }
    println!();
    println!(
        "serial {} · updated {}",
        snapshot.serial,
        snapshot.updated_at.to_rfc3339()
    );
    Ok(())
}

pub async fn handle_show(project_root: &std::path::Path, address: &str) -> anyhow::Result<()> {
    let address = Address::parse(address)?;
    let snapshot = StateManager::new(project_root).load().await?;

    let Some(record) = snapshot.get(&address) else {
        eprintln!("{}", format!("✗ '{}' is not recorded in state", address).red());
        std::process::exit(1);
    };

    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}
