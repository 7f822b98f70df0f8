//! Command-line interface definition.
//!
//! Depends on `clap` and `types` only; `build.rs` includes both files to
//! render the man page and shell completions.

use crate::types::RunMode;
use clap::builder::ValueParser;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// provision - Policy-driven package installation for machine images
#[derive(Parser)]
#[command(name = "provision")]
#[command(about = "Resolve and install package groups across prioritized backends")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence when set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        config: PathBuf,
    },
    /// Show the backends each package would be tried on, without installing
    Plan {
        /// Path to configuration file
        config: PathBuf,
    },
    /// Resolve every configured group and report the outcome
    Run {
        /// Path to configuration file
        config: PathBuf,

        /// Scripted backend outcomes (JSON); without it every install is a dry run
        #[arg(long)]
        outcomes: Option<PathBuf>,

        /// Override the configured run mode: strict or best-effort
        #[arg(long, value_name = "MODE", value_parser = ValueParser::new(RunMode::from_str))]
        mode: Option<RunMode>,

        /// Write the ledger and summary as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
