//! CLI for the DLM download manager.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dlm_core::config;

use commands::{run_serve, run_status};

/// Top-level CLI for the DLM download manager.
#[derive(Debug, Parser)]
#[command(name = "dlm")]
#[command(about = "DLM: segmented download manager with an HTTP control plane", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Restore saved jobs and serve the control plane until SIGINT/SIGTERM.
    Serve {
        /// Address to bind (overrides `listen_host`).
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides `listen_port`).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show jobs saved in the settings file.
    Status,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Serve { host, port } => run_serve(cfg, host, port).await?,
            CliCommand::Status => run_status(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
