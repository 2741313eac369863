use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "grid", about = "Remote state backend and dependency-graph service for IaC tools", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server.
    Serve {
        /// Path to a YAML config file. Falls back to GRID_* env vars and
        /// defaults when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Connect to the database and run schema migrations, then exit.
    Migrate {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
