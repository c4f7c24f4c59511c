//! TCP listener for telnet clients
//!
//! Accepts connections on the public port and spawns a handler task per
//! client until the shutdown signal fires.

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, trace};

/// TCP server accepting telnet client connections
pub struct Server {
    /// Address to bind, `host:port`
    listen_addr: String,
    /// The listener (created on bind)
    listener: Option<TcpListener>,
}

impl Server {
    /// Create a new server that will listen on the given address
    ///
    /// # Arguments
    /// * `listen_addr` - `host:port`; port 0 picks a free port
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            listener: None,
        }
    }

    /// Get the configured listen address
    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }

    /// Bind the listening socket
    pub async fn bind(&mut self) -> Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await.map_err(|e| {
            Error::Socket(format!("Failed to bind to {}: {}", self.listen_addr, e))
        })?;

        match listener.local_addr() {
            Ok(addr) => info!(addr = %addr, "Server listening"),
            Err(_) => info!(addr = %self.listen_addr, "Server listening"),
        }
        self.listener = Some(listener);
        Ok(())
    }

    /// Address actually bound, once `bind` has succeeded
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| Error::Socket("Server is not bound".to_string()))?;
        listener
            .local_addr()
            .map_err(|e| Error::Socket(format!("Failed to read local address: {}", e)))
    }

    /// Accept the next client connection
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| Error::Socket("Server is not bound".to_string()))?;

        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| Error::Socket(format!("Failed to accept connection: {}", e)))?;

        trace!(peer = %peer, "Accepted new client connection");
        Ok((stream, peer))
    }

    /// Run the server with a connection handler
    ///
    /// Runs until the shutdown signal is received. Sessions already in
    /// progress keep running on their own tasks.
    ///
    /// # Arguments
    /// * `handler` - Async function to handle each client connection
    /// * `shutdown_rx` - Watch receiver for shutdown signal
    pub async fn run<F, Fut>(&self, handler: F, mut shutdown_rx: watch::Receiver<bool>) -> Result<()>
    where
        F: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| Error::Socket("Server is not bound".to_string()))?;

        let handler = Arc::new(handler);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Received shutdown signal, stopping server");
                        break;
                    }
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            trace!(peer = %peer, "Accepted new client connection");
                            let handler = Arc::clone(&handler);
                            tokio::spawn(async move {
                                if let Err(e) = handler(stream, peer).await {
                                    debug!(peer = %peer, error = %e, "Connection handler error");
                                }
                            });
                        }
                        Err(e) => {
                            // Keep accepting; one failed accept must not stop the listener
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
