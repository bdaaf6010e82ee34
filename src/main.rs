use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use dealflow::commands::{check, stages, validate};
use dealflow::logging;
use dealflow::models::Trigger;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dealflow")]
#[command(about = "Inspect and check sales pipeline stage configurations", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a pipeline config file (.toml, .yaml or .yml)
    Validate {
        /// Path to the pipeline config
        config: PathBuf,
    },

    /// Show the ordered stages with their requirements and capture rules
    Stages {
        /// Path to the pipeline config
        config: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether a move between two stages is allowed
    Check {
        /// Path to the pipeline config
        config: PathBuf,

        /// Origin stage id or key
        from: String,

        /// Target stage id or key
        to: String,

        /// What initiates the move: drag, click or explicit-action
        #[arg(short, long, default_value = "drag")]
        trigger: Trigger,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Validate { config } => validate::execute(&config),
        Commands::Stages { config, json } => stages::execute(&config, json),
        Commands::Check {
            config,
            from,
            to,
            trigger,
        } => check::execute(&config, &from, &to, trigger),
    }
}
