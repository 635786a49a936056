//! CLI parser and command dispatch.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ocrsweep")]
#[command(about = "Bulk text recognition over object storage")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Run recognition over every listed object and print the report
    Run(commands::RunArgs),

    /// List the objects a run would process
    List(commands::ListArgs),
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run(args).await,
        Commands::List(args) => commands::list(args).await,
    }
}
