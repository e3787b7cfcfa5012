mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "browsepilot")]
#[command(about = "An AI agent that drives your browser through a remote extension", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize browsepilot configuration
    Onboard {
        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration status
    Status,

    /// Run one task, then exit
    Run {
        /// The task, in plain language
        task: String,

        /// Port to listen on for the extension (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Start the gateway (long-running daemon with the web API)
    Gateway {
        /// Port to listen on (overrides config gateway.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config gateway.host)
        #[arg(long)]
        host: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Onboard { force } => {
            commands::onboard::run(force)?;
        }
        Commands::Status => {
            commands::status::run()?;
        }
        Commands::Run { task, port } => {
            commands::run_cmd::run(&task, port).await?;
        }
        Commands::Gateway { port, host } => {
            commands::gateway::run(host, port).await?;
        }
    }

    Ok(())
}
