use colored::Colorize;
use kumo_engine::StateManager;

pub async fn handle(project_root: &std::path::Path) -> anyhow::Result<()> {
    let snapshot = StateManager::new(project_root).load().await?;

    if snapshot.outputs.is_empty() {
        println!(
            "{}",
            "No outputs recorded. Run 'kumo apply' first.".yellow()
        );
        return Ok(());
    }

    for (name, value) in &snapshot.outputs {
        println!("{} = {}", name.cyan(), value);
    }
    Ok(())
}
