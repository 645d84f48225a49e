// SPDX-License-Identifier: Apache-2.0
//! Command-line surface. Thin wrappers only — no business logic lives
//! here, it dispatches straight into the core crates.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "corral", version, about = "Mobile-first supervisor for long-running agent subprocesses")]
pub struct Cli {
    /// Explicit config file path (in addition to the standard search path).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). Overridden by RUST_LOG.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the supervisor: process registry, secure transport listener,
    /// and (if configured) the relay client.
    Serve {
        /// Override the transport bind address, e.g. 0.0.0.0:7417.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Config subcommands.
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Identity/credential subcommands.
    #[command(subcommand)]
    Auth(AuthCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the fully merged configuration as YAML.
    Show,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Derive and persist a fresh SRP identity (remote-access.json),
    /// replacing any existing one.
    SetPassword {
        #[arg(long)]
        username: String,
    },
}
