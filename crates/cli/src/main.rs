//! contextweave CLI: the main entry point.
//!
//! Commands:
//! - `assemble`: build the context for a discussion and print it
//! - `languages`: list, select or delete cached language packs
//! - `config`: show, locate, validate or initialise the configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "contextweave",
    about = "contextweave: token-budgeted context assembly for LLM prompts",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the context for a discussion
    Assemble(commands::assemble::AssembleArgs),

    /// Manage the personality's language packs
    Languages {
        #[command(subcommand)]
        action: commands::languages::LanguagesAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config_cmd::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so the assembled prompt can be piped
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Assemble(args) => commands::assemble::run(args).await?,
        Commands::Languages { action } => commands::languages::run(action).await?,
        Commands::Config { action } => commands::config_cmd::run(action).await?,
    }

    Ok(())
}
