//! CLI module for bpq-auth-proxy
//!
//! This module provides the command-line interface using clap derive macros.

pub mod args;
pub mod commands;
mod exit_code;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use exit_code::ExitCode;

use args::{CompletionArgs, ConfigArgs, RunArgs, UsersArgs, VersionArgs};

/// Authenticating telnet relay for BPQ packet-radio nodes
#[derive(Parser, Debug)]
#[command(name = "bpq-auth-proxy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(long, global = true, env = "BPQ_AUTH_PROXY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the proxy in the foreground
    Run(RunArgs),

    /// Show or validate configuration
    Config(ConfigArgs),

    /// Inspect the credential file
    Users(UsersArgs),

    /// Show version information
    Version(VersionArgs),

    /// Generate shell completions
    Completion(CompletionArgs),
}
