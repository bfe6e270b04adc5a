//! Herald: autonomous Solana content-posting agent
//!
//! Main binary with subcommands:
//! - `daemon`: Initial run, then the randomized activation-window scheduler
//! - `run-once`: A single supervised pipeline run

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod daemon;

use config::{AgentArgs, ScheduleArgs};

#[derive(Parser)]
#[command(name = "herald")]
#[command(about = "Autonomous Solana content-posting agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler loop until interrupted
    Daemon {
        #[command(flatten)]
        agent: AgentArgs,

        #[command(flatten)]
        schedule: ScheduleArgs,
    },

    /// Perform one pipeline run and exit
    RunOnce {
        #[command(flatten)]
        agent: AgentArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "herald=info,herald_scheduler=info,herald_pipeline=info".to_string()
            }),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon { agent, schedule } => daemon::run(&agent, &schedule).await,
        Commands::RunOnce { agent } => daemon::run_once(&agent).await,
    }
}
