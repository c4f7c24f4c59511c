//! Config command - show or validate configuration

use anyhow::{Context, Result, bail};
use std::path::PathBuf;

use crate::cli::args::ConfigArgs;
use crate::config::{Config, config_search_paths, load_config_from_path_or_default};

/// Example configuration content
pub fn example_config() -> &'static str {
    r#"# bpq-auth-proxy configuration file

# Public side: where telnet clients connect
listen_address = "0.0.0.0"
listen_port = 8773

# BPQ node telnet port (keep it firewalled from the outside)
backend_host = "127.0.0.1"
backend_port = 8772

# Two columns per row: callsign,password
# Supports ~ and $VAR expansion
credential_source_path = "users.csv"

# "per_session" re-reads the file for every connection,
# "on_signal" keeps one copy and re-reads it on SIGHUP
credential_reload = "per_session"

# Backend text that means the node is asking for the password
prompt_marker = "Password :"

# Sent to the client before closing a refused login
rejection_message = "ERROR: Authentication Failed\n"

# Deadlines ("0" disables): first line from the client, password after the prompt
identifier_timeout = "2m"
password_timeout = "1m"

# Time allowed to open the backend connection
connect_timeout = "10s"

# JSONL audit trail of logins and sessions
# audit_log = "~/.local/state/bpq-auth-proxy/audit.jsonl"
"#
}

/// Execute the config command
pub async fn execute(args: ConfigArgs, config_path: Option<PathBuf>) -> Result<()> {
    if args.paths {
        println!("Config search paths (in priority order):");
        for (i, cp) in config_search_paths().iter().enumerate() {
            let exists = if cp.path.exists() {
                "\x1b[32m[exists]\x1b[0m"
            } else {
                ""
            };
            println!("  {}. {} {}", i + 1, cp.description, exists);
            println!("     {}", cp.path.display());
        }
        return Ok(());
    }

    if args.example {
        match args.format.as_str() {
            "json" => {
                let config: Config =
                    toml::from_str(example_config()).context("Failed to parse example config")?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            _ => print!("{}", example_config()),
        }
        return Ok(());
    }

    let config_file = load_config_from_path_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;
    let source = if config_file.path.as_os_str().is_empty() {
        "defaults (no configuration file found)".to_string()
    } else {
        config_file.path.display().to_string()
    };

    if args.validate {
        match config_file.config.resolve() {
            Ok(resolved) => {
                println!("Configuration is valid: {}", source);
                println!("  listen:  {}", resolved.listen_addr());
                println!("  backend: {}", resolved.backend_addr());
                println!("  users:   {}", resolved.credential_source_path.display());
                if !resolved.credential_source_path.exists() {
                    println!("  warning: credential file does not exist");
                }
                return Ok(());
            }
            Err(e) => bail!("Configuration is invalid ({}): {}", source, e),
        }
    }

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&config_file.config)?),
        _ => {
            println!("# Effective configuration from: {}", source);
            println!();
            print!(
                "{}",
                toml::to_string_pretty(&config_file.config).context("Failed to render config")?
            );
        }
    }

    Ok(())
}
