use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "gavel")]
#[command(version, about = "Workflow orchestration engine for AI legal motion drafting")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a TOML file of model-route overrides
    #[arg(long, global = true)]
    pub routes: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the phase-by-tier routing table
    Registry,
    /// Compute the advisory refund for a cancellation
    Refund {
        /// Amount the customer paid, in cents
        #[arg(long)]
        paid_cents: i64,
        /// Phase code the order was in (e.g. "VIII")
        #[arg(long)]
        phase: String,
    },
    /// Run the citation extractors over a text file
    Extract {
        /// Motion text file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "gavel=debug" } else { "gavel=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Registry => cmd::registry::run(cli.routes.as_deref()),
        Commands::Refund { paid_cents, phase } => cmd::refund::run(paid_cents, &phase),
        Commands::Extract { file } => cmd::extract::run(&file),
    }
}
