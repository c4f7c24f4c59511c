//! Argument structures for CLI commands

use clap::Args;
use clap_complete::Shell;
use std::path::PathBuf;

/// Arguments for the `run` command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Port to listen on (overrides `listen_port`)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Backend telnet address as HOST:PORT (overrides `backend_host`/`backend_port`)
    #[arg(short, long, value_name = "HOST:PORT")]
    pub backend: Option<String>,

    /// Credential CSV file (overrides `credential_source_path`)
    #[arg(short, long, value_name = "PATH")]
    pub users: Option<PathBuf>,

    /// Path to JSONL audit log (overrides `audit_log`)
    #[arg(long, value_name = "PATH")]
    pub audit_log: Option<PathBuf>,
}

/// Arguments for the `config` command
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Validate configuration only
    #[arg(long)]
    pub validate: bool,

    /// Show an example configuration
    #[arg(long, conflicts_with = "paths")]
    pub example: bool,

    /// Show configuration search paths
    #[arg(long)]
    pub paths: bool,

    /// Output format
    #[arg(short, long, default_value = "toml", value_parser = ["toml", "json"])]
    pub format: String,
}

/// Arguments for the `users` command
#[derive(Args, Debug, Clone)]
pub struct UsersArgs {
    /// Credential CSV file (defaults to `credential_source_path`)
    #[arg(short, long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Report whether this identifier has an entry
    #[arg(long, value_name = "ID")]
    pub check: Option<String>,

    /// List known identifiers
    #[arg(short, long, conflicts_with = "check")]
    pub list: bool,
}

/// Arguments for the `version` command
#[derive(Args, Debug, Clone)]
pub struct VersionArgs {
    /// Show build details
    #[arg(long)]
    pub build_info: bool,
}

/// Arguments for the `completion` command
#[derive(Args, Debug, Clone)]
pub struct CompletionArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
