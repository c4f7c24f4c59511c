//! Users command - inspect the credential file
//!
//! Reports how the file parses. Secrets are never printed.

use anyhow::{Context, Result, bail};
use std::path::PathBuf;

use crate::cli::args::UsersArgs;
use crate::config::{expand_path, load_config_from_path_or_default};
use crate::credentials::CredentialStore;

/// Execute the users command
pub async fn execute(args: UsersArgs, config_path: Option<PathBuf>) -> Result<()> {
    let path = match args.file {
        Some(path) => path,
        None => {
            let config_file = load_config_from_path_or_default(config_path.as_deref())
                .context("Failed to load configuration")?;
            PathBuf::from(expand_path(&config_file.config.credential_source_path)?)
        }
    };

    let (store, report) = CredentialStore::try_load(&path).await?;

    if let Some(id) = &args.check {
        if store.contains(id) {
            println!("{}: known", id);
            return Ok(());
        }
        bail!("{}: not found in {}", id, path.display());
    }

    println!("Credential file: {}", path.display());
    println!("  entries:    {}", store.len());
    println!("  skipped:    {}", report.skipped);
    if report.duplicates > 0 {
        println!("  duplicates: {} (last row wins)", report.duplicates);
    }

    if args.list {
        println!();
        for id in store.identifiers() {
            println!("{}", id);
        }
    }

    Ok(())
}
