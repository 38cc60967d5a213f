//! bareagent CLI: the main entry point.
//!
//! Commands:
//! - `chat`: Interactive session (Ctrl+C cancels the running turn)
//! - `run`: Send one message and print the reply
//! - `config`: Show the effective configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "bareagent",
    about = "bareagent: a minimal tool-calling agent loop",
    version
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
    /// Chat with the agent interactively
    Chat,

    /// Send a single message and print the reply
    Run {
        /// The message to send
        #[arg(short, long)]
        message: String,
    },

    /// Print the effective configuration (secrets redacted)
    Config {
        /// Print the config file path instead
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for replies
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat => commands::chat::run().await?,
        Commands::Run { message } => commands::run::run(message).await?,
        Commands::Config { path } => commands::config_cmd::run(path)?,
    }

    Ok(())
}
