use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use medic::config::MedicToml;
use medic::telemetry::init_tracing;

mod cmd;

#[derive(Parser)]
#[command(name = "medic")]
#[command(version, about = "Remediates stalled merge and pull requests with a coding agent")]
pub struct Cli {
    /// Path to medic.toml (defaults to $MEDIC_CONFIG, ./medic.toml, then the user config dir)
    #[arg(short, long, global = true, env = "MEDIC_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan every configured server and remediate requests that need attention
    Scan {
        /// Only scan this server
        #[arg(short, long)]
        server: Option<String>,

        /// Classify and select actions without cloning or pushing
        #[arg(long)]
        dry_run: bool,

        /// Print the batch reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the attention signals and selected action for one request
    Classify {
        #[arg(short, long)]
        server: String,

        #[arg(short, long)]
        project: u64,

        #[arg(short, long)]
        request: u64,
    },
    /// Have the agent review one request and post the review as a note
    Review {
        #[arg(short, long)]
        server: String,

        #[arg(short, long)]
        project: u64,

        #[arg(short, long)]
        request: u64,
    },
    /// View, validate or create configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a starter medic.toml
    Init {
        /// Where to write it (defaults to ./medic.toml)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Commands::Config { command } = &cli.command {
        return cmd::cmd_config(cli.config.as_deref(), command.clone());
    }

    let config = MedicToml::load_or_default(cli.config.as_deref())?;
    let telemetry = init_tracing(&config.logging, cli.verbose, cli.json_logs);

    let clean = match &cli.command {
        Commands::Scan { server, dry_run, json } => {
            cmd::cmd_scan(&config, server.as_deref(), *dry_run, *json).await?
        }
        Commands::Classify {
            server,
            project,
            request,
        } => {
            cmd::cmd_classify(&config, server, *project, *request).await?;
            true
        }
        Commands::Review {
            server,
            project,
            request,
        } => cmd::cmd_review(&config, server, *project, *request).await?,
        Commands::Config { .. } => true,
    };

    // Flush the file sink before a non-zero exit
    drop(telemetry);
    if !clean {
        std::process::exit(1);
    }

    Ok(())
}
