//! CLI for the PDM download engine.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pdm_core::config;

use commands::{run_get, run_probe, run_session, GetArgs};

/// Top-level CLI for the PDM download engine.
#[derive(Debug, Parser)]
#[command(name = "pdm")]
#[command(about = "PDM: project-scoped parallel download engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one URL into a project and wait until it finishes.
    Get(GetArgs),

    /// Print what the server reports about a URL (size, resume, filename).
    Probe {
        /// HTTP, HTTPS or FTP URL.
        url: String,
    },

    /// Read controller commands from stdin, one per line, and print JSON.
    Session {
        /// Also print task events as they happen.
        #[arg(long)]
        watch: bool,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get(args) => run_get(cfg, args).await?,
            CliCommand::Probe { url } => run_probe(&cfg, &url).await?,
            CliCommand::Session { watch } => run_session(cfg, watch).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
