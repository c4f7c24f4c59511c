//! Per-connection glue between the listener and a session
//!
//! For every accepted client the proxy opens the backend connection, takes
//! a credential snapshot and runs a [`Session`] to completion.

use crate::credentials::CredentialSource;
use crate::error::Result;
use crate::logging::{AuditLog, LogEvent, LogEventKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::session::{Session, SessionConfig, SessionReport};
use super::Backend;

/// Authenticating relay shared by all connections of one listener
pub struct Proxy {
    /// Backend connector
    backend: Arc<Backend>,
    /// Credential snapshots for new sessions
    credentials: Arc<CredentialSource>,
    /// Protocol settings handed to every session
    config: Arc<SessionConfig>,
    /// Audit event sink
    audit: Arc<AuditLog>,
    /// Connection counter for session IDs
    connection_counter: AtomicU64,
}

impl Proxy {
    /// Create a new proxy
    pub fn new(backend: Backend, credentials: CredentialSource, config: SessionConfig) -> Self {
        Self::new_shared(Arc::new(backend), Arc::new(credentials), Arc::new(config))
    }

    /// Create a new proxy with Arc-wrapped components
    pub fn new_shared(
        backend: Arc<Backend>,
        credentials: Arc<CredentialSource>,
        config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            backend,
            credentials,
            config,
            audit: Arc::new(AuditLog::disabled()),
            connection_counter: AtomicU64::new(0),
        }
    }

    /// Record session events to an audit log
    pub fn with_audit_log(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    /// Get a reference to the backend
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Get a reference to the credential source
    pub fn credentials(&self) -> &CredentialSource {
        &self.credentials
    }

    /// Get a reference to the audit log
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Handle a client connection
    ///
    /// Fails with `BackendUnavailable` (after closing the client) if the
    /// backend cannot be reached; otherwise relays until the session ends.
    pub async fn handle_client(
        &self,
        mut client: TcpStream,
        peer: SocketAddr,
    ) -> Result<SessionReport> {
        let session_id = self.connection_counter.fetch_add(1, Ordering::Relaxed);
        info!(session = session_id, peer = %peer, "Client connected");

        if let Err(e) = client.set_nodelay(true) {
            debug!(session = session_id, error = %e, "Failed to set TCP_NODELAY");
        }

        let credentials = self.credentials.snapshot().await;

        let backend = match self.backend.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(session = session_id, peer = %peer, error = %e, "Backend unavailable, dropping client");
                self.audit.record(
                    &LogEvent::new(LogEventKind::BackendUnavailable)
                        .with_session_id(session_id)
                        .with_peer(peer.to_string())
                        .with_error(e.to_string()),
                );
                let _ = client.shutdown().await;
                return Err(e);
            }
        };
        debug!(session = session_id, backend = %self.backend.addr(), "Backend connected");

        let report = Session::new(client, backend, Arc::clone(&self.config), credentials)
            .with_identity(session_id, peer.to_string())
            .with_audit_log(Arc::clone(&self.audit))
            .run()
            .await;

        debug!(session = session_id, peer = %peer, "Client disconnected");
        Ok(report)
    }
}
