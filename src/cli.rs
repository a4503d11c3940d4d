use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Parser)]
#[command(name = "indexgate", about = "Access-control decision engine for index stores")]
pub struct Cli {
    /// Path to the settings file (defaults to ./indexgate.toml if present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Validate settings and the access control list, then exit.
    Check,
    /// Evaluate one request fixture and print the decision as JSON.
    Eval {
        #[arg(long)]
        request: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}
