//! adaptest CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "adaptest", version, about = "Computerized adaptive testing engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and a sample item bank
    Init,

    /// Validate an item bank
    Validate {
        /// Path to a JSON item bank
        #[arg(long)]
        bank: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run simulated candidates through the engine
    Simulate {
        /// Path to a JSON item bank
        #[arg(long)]
        bank: PathBuf,

        /// True ability of the simulated candidates
        #[arg(long, allow_hyphen_values = true)]
        true_theta: f64,

        /// Test mode: adaptive or fixed
        #[arg(long, default_value = "adaptive")]
        mode: String,

        /// Question count (fixed mode)
        #[arg(long)]
        count: Option<usize>,

        /// Included domains, comma-separated (fixed mode; default: all)
        #[arg(long)]
        domains: Option<String>,

        /// Number of simulated sessions
        #[arg(long, default_value = "1")]
        replications: usize,

        /// Seed for the engine and the simulated responses
        #[arg(long)]
        seed: Option<u64>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("adaptest=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { bank, config } => commands::validate::execute(bank, config),
        Commands::Simulate {
            bank,
            true_theta,
            mode,
            count,
            domains,
            replications,
            seed,
            config,
            format,
        } => {
            commands::simulate::execute(commands::simulate::SimulateArgs {
                bank,
                true_theta,
                mode,
                count,
                domains,
                replications,
                seed,
                config,
                format,
            })
            .await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
