//! Run command - execute the proxy in the foreground

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cli::args::RunArgs;
use crate::config::{Config, load_config_from_path_or_default, split_host_port};
use crate::credentials::{CredentialSource, CredentialStore};
use crate::logging::{AuditLog, LogEvent, LogEventKind};
use crate::relay::{Backend, Proxy, Server};

/// Apply command line overrides on top of the loaded configuration
pub fn apply_overrides(config: &mut Config, args: &RunArgs) -> Result<()> {
    if let Some(port) = args.port {
        config.listen_port = port;
    }
    if let Some(backend) = &args.backend {
        let (host, port) = split_host_port(backend)
            .with_context(|| format!("Invalid --backend value '{}'", backend))?;
        config.backend_host = host;
        config.backend_port = port;
    }
    if let Some(users) = &args.users {
        config.credential_source_path = users.to_string_lossy().into_owned();
    }
    if let Some(audit_log) = &args.audit_log {
        config.audit_log = Some(audit_log.to_string_lossy().into_owned());
    }
    Ok(())
}

/// Execute the run command
pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config_file = load_config_from_path_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;
    if config_file.path.as_os_str().is_empty() {
        info!("No configuration file found, using defaults");
    } else {
        info!(path = %config_file.path.display(), "Loaded configuration");
    }

    let mut config = config_file.config;
    apply_overrides(&mut config, &args)?;
    let resolved = config.resolve().context("Invalid configuration")?;

    let audit = Arc::new(match &resolved.audit_log {
        Some(path) => {
            let audit = AuditLog::open(path)
                .with_context(|| format!("Failed to open audit log {}", path.display()))?;
            info!(path = %path.display(), "Audit logging enabled");
            audit
        }
        None => AuditLog::disabled(),
    });

    check_credentials(&resolved.credential_source_path).await;
    let credentials = Arc::new(
        CredentialSource::from_policy(resolved.credential_reload, &resolved.credential_source_path)
            .await,
    );

    let backend = Backend::new(resolved.backend_host.clone(), resolved.backend_port)
        .with_connect_timeout(resolved.connect_timeout);
    let proxy = Arc::new(
        Proxy::new_shared(
            Arc::new(backend),
            Arc::clone(&credentials),
            Arc::new(resolved.session_config()),
        )
        .with_audit_log(Arc::clone(&audit)),
    );

    let mut server = Server::new(resolved.listen_addr());
    server.bind().await.context("Failed to start listener")?;
    let local_addr = server.local_addr()?;

    info!(
        listen = %local_addr,
        backend = %resolved.backend_addr(),
        users = %resolved.credential_source_path.display(),
        reload = ?resolved.credential_reload,
        "Starting bpq-auth-proxy"
    );
    audit.record(&LogEvent::server_start(local_addr.to_string()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(()) => {}
            Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
        }
        let _ = shutdown_tx.send(true);
    });

    #[cfg(unix)]
    {
        let credentials = Arc::clone(&credentials);
        let audit = Arc::clone(&audit);
        tokio::spawn(async move {
            if let Err(e) = reload_on_hangup(credentials, audit).await {
                warn!(error = %e, "Failed to install SIGHUP handler, reload disabled");
            }
        });
    }

    info!("Proxy server started. Press Ctrl+C to stop.");

    let handler_proxy = Arc::clone(&proxy);
    server
        .run(
            move |stream, peer| {
                let proxy = Arc::clone(&handler_proxy);
                async move { proxy.handle_client(stream, peer).await.map(|_| ()) }
            },
            shutdown_rx,
        )
        .await
        .context("Server error")?;

    audit.record(&LogEvent::server_stop());
    info!("Shutdown complete");

    Ok(())
}

/// Report problems with the credential file before accepting clients
///
/// The proxy still starts; sessions just see an empty store until the file
/// becomes readable.
async fn check_credentials(path: &Path) {
    match CredentialStore::try_load(path).await {
        Ok((store, report)) => {
            info!(
                path = %path.display(),
                entries = store.len(),
                skipped = report.skipped,
                "Credential file readable"
            );
            if store.is_empty() {
                warn!(path = %path.display(), "Credential file has no entries, all logins will be refused");
            }
        }
        Err(e) => warn!(error = %e, "Credential file unavailable, all logins will be refused"),
    }
}

/// Wait for Ctrl-C or SIGTERM
async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = term.recv() => {}
        }
        info!("Received shutdown signal, stopping...");
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received shutdown signal, stopping...");
        Ok(())
    }
}

/// Reload the shared credential snapshot on every SIGHUP
#[cfg(unix)]
async fn reload_on_hangup(
    credentials: Arc<CredentialSource>,
    audit: Arc<AuditLog>,
) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut hangup = signal(SignalKind::hangup())?;

    while hangup.recv().await.is_some() {
        match credentials.reload().await {
            Some(entries) => audit.record(
                &LogEvent::new(LogEventKind::CredentialsReload).with_entries(entries as u64),
            ),
            None => info!("Received SIGHUP; credentials are already read per session"),
        }
    }
    Ok(())
}
