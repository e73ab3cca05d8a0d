mod commands;
mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kumo")]
#[command(about = "Declare it. Reconcile it. Infrastructure as a manifest.", long_about = None)]
struct Cli {
    /// Project directory (defaults to walking up from the current directory)
    #[arg(long, global = true, env = "KUMO_PROJECT_ROOT")]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the declarations
    Validate,
    /// Show the change-set against recorded state
    Plan,
    /// Apply the change-set
    Apply {
        /// Apply without asking for confirmation
        #[arg(short, long)]
        yes: bool,
        /// Maximum number of resources applied at the same time
        #[arg(long, default_value_t = 4)]
        parallelism: usize,
    },
    /// Destroy everything recorded in state
    Destroy {
        /// Destroy without asking for confirmation
        #[arg(short, long)]
        yes: bool,
        /// Maximum number of resources destroyed at the same time
        #[arg(long, default_value_t = 4)]
        parallelism: usize,
    },
    /// Print the resource creation order
    Graph {
        /// Emit Graphviz dot instead of a list
        #[arg(long)]
        dot: bool,
    },
    /// Inspect recorded state
    #[command(subcommand)]
    State(StateCommands),
    /// Show reconciled outputs
    Output,
    /// Print version information
    Version,
}

#[derive(Subcommand)]
enum StateCommands {
    /// List recorded resources
    List,
    /// Show one recorded resource
    Show {
        /// Resource address (type.name)
        address: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Version needs no project
    if matches!(cli.command, Commands::Version) {
        println!("kumo {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let project_root = utils::resolve_project_root(cli.project)?;

    match cli.command {
        Commands::Validate => commands::validate::handle(&project_root).await,
        Commands::Plan => commands::plan::handle(&project_root).await,
        Commands::Apply { yes, parallelism } => {
            commands::apply::handle(&project_root, yes, parallelism).await
        }
        Commands::Destroy { yes, parallelism } => {
            commands::destroy::handle(&project_root, yes, parallelism).await
        }
        Commands::Graph { dot } => commands::graph::handle(&project_root, dot),
        Commands::State(state_command) => match state_command {
            StateCommands::List => commands::state::handle_list(&project_root).await,
            StateCommands::Show { address } => {
                commands::state::handle_show(&project_root, &address).await
            }
        },
        Commands::Output => commands::output::handle(&project_root).await,
        Commands::Version => Ok(()),
    }
}
