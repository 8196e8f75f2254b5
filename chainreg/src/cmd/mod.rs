//! CLI definitions and command implementations.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod init;
pub mod probe;

/// Chain backend registry: configuration and backend diagnostics.
#[derive(Debug, Parser)]
#[command(name = "chainreg")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate a default TOML configuration file.
    Init {
        /// Output path for the configuration file.
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite the file if it already exists.
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Resolve every active chain's backend and check that it answers.
    Probe {
        /// Path to the TOML configuration file.
        #[arg(short, long, env = "CONFIG", default_value = "config.toml")]
        config: PathBuf,

        /// Keep probing every N seconds until interrupted.
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        watch: Option<u64>,
    },
}
