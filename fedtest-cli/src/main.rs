//! # fedtest
//!
//! Runs multi-party protocol test suites.
//!
//! ## Commands
//!
//! - `run`: run every case, each role in its own process, under one deadline
//!   per case
//! - `role`: run a single role's side of every case in this terminal
//! - `worker`: internal; run one role from a request on stdin
//!
//! ## Example
//!
//! ```bash
//! # Run the whole suite
//! fedtest --config fedtest.toml run
//!
//! # Run one case three times
//! fedtest run --case mock_small --repeat 3
//!
//! # Manual mode: one terminal per role, same session tag
//! fedtest role guest --session t1
//! fedtest role host --session t1
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` to change the level.

use anyhow::Result;
use clap::{Parser, Subcommand};
use fedtest_types::Role;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{role, run, worker};

/// Runs multi-party protocol test suites.
#[derive(Parser, Debug)]
#[command(name = "fedtest")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Suite file
    #[arg(long, global = true, default_value = "fedtest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run cases with every role in its own process
    Run {
        /// Only run these cases (repeatable)
        #[arg(long = "case")]
        cases: Vec<String>,

        /// Run the selected cases this many times
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
        repeat: u32,

        /// Keep federation job directories and models of passed cases
        #[arg(long)]
        keep_artifacts: bool,
    },

    /// Run one role's side of every case in this process
    Role {
        /// guest, host, host-N or coordinator
        role: Role,

        /// Session tag shared by the terminals of one manual run
        #[arg(long)]
        session: Option<String>,

        /// Only run these cases (repeatable)
        #[arg(long = "case")]
        cases: Vec<String>,
    },

    /// Internal: run one role from a request on stdin
    #[command(hide = true)]
    Worker,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            cases,
            repeat,
            keep_artifacts,
        } => run::run(&cli.config, cases, repeat as usize, keep_artifacts).await,
        Commands::Role {
            role,
            session,
            cases,
        } => role::run(&cli.config, role, session.as_deref(), &cases).await,
        Commands::Worker => worker::run().await,
    }
}
